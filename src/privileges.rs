//! Detection of elevated privileges.
//!
//! Firewall changes and raw ARP frames both need root / Administrator. When the
//! process is not elevated, enforcement commands are prefixed with `sudo`.

#[cfg(windows)]
pub fn is_elevated() -> bool {
    use std::mem;
    use std::ptr;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::GetCurrentProcess;
    use winapi::um::processthreadsapi::OpenProcessToken;
    use winapi::um::securitybaseapi::GetTokenInformation;
    use winapi::um::winnt::{TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};

    let mut token_handle = ptr::null_mut();
    unsafe {
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token_handle) == 0 {
            return false;
        }
    }

    let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
    let mut return_length = 0;
    let elevation_size = mem::size_of::<TOKEN_ELEVATION>() as u32;

    let success = unsafe {
        GetTokenInformation(
            token_handle,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            elevation_size,
            &mut return_length,
        ) != 0
    };

    unsafe {
        CloseHandle(token_handle);
    }

    success && elevation.TokenIsElevated != 0
}

#[cfg(unix)]
pub fn is_elevated() -> bool {
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .map(|out| parse_uid(&String::from_utf8_lossy(&out.stdout)) == Some(0))
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> bool {
    false
}

#[cfg(unix)]
fn parse_uid(output: &str) -> Option<u32> {
    output.trim().parse().ok()
}
