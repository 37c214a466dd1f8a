//! File ownership and permission handling for generated resource files.

use anyhow::{anyhow, bail, Context, Result};
use std::ffi::CString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Owner, group and mode applied to the output directory and every file in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: u32,
}

impl Ownership {
    pub fn resolve(owner: Option<&str>, group: Option<&str>, mode: u32) -> Result<Self> {
        Ok(Self {
            uid: owner.map(lookup_user).transpose()?,
            gid: group.map(lookup_group).transpose()?,
            mode,
        })
    }

    pub fn apply(&self, path: &Path) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
            .with_context(|| format!("Failed to set mode {:o} on {:?}", self.mode, path))?;

        if self.uid.is_some() || self.gid.is_some() {
            std::os::unix::fs::chown(path, self.uid, self.gid)
                .with_context(|| format!("Failed to change ownership of {:?}", path))?;
        }
        Ok(())
    }
}

/// Octal mode string such as `0755` or `0o644`
pub fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode.trim().trim_start_matches("0o");
    let value = u32::from_str_radix(digits, 8).map_err(|_| anyhow!("Invalid file mode '{}'", mode))?;
    if value > 0o7777 {
        bail!("Invalid file mode '{}'", mode);
    }
    Ok(value)
}

fn lookup_user(name: &str) -> Result<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Ok(uid);
    }
    let c_name = CString::new(name).with_context(|| format!("Invalid user name '{}'", name))?;
    // SAFETY: getpwnam receives a valid NUL-terminated string; the returned
    // record is only read before any other passwd call on this thread.
    let uid = unsafe {
        let entry = libc::getpwnam(c_name.as_ptr());
        if entry.is_null() {
            None
        } else {
            Some((*entry).pw_uid)
        }
    };
    uid.ok_or_else(|| anyhow!("Unknown user '{}'", name))
}

fn lookup_group(name: &str) -> Result<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Ok(gid);
    }
    let c_name = CString::new(name).with_context(|| format!("Invalid group name '{}'", name))?;
    // SAFETY: as for getpwnam above.
    let gid = unsafe {
        let entry = libc::getgrnam(c_name.as_ptr());
        if entry.is_null() {
            None
        } else {
            Some((*entry).gr_gid)
        }
    };
    gid.ok_or_else(|| anyhow!("Unknown group '{}'", name))
}
