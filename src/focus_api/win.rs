use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, HANDLE},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemInformation::GetTickCount64,
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
            },
        },
        UI::{
            Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
            WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId},
        },
    },
};

use super::{app_name_from_path, AppIdentity, FocusSampler};

#[tracing::instrument]
pub fn get_foreground_app() -> Result<AppIdentity> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        let err = unsafe { GetLastError() };
        let mut message_buffer = [0u16; 2048];
        let size = unsafe {
            FormatMessageW(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                None,
                err.0,
                LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
                PWSTR::from_raw(message_buffer.as_mut_ptr()),
                2048,
                None,
            )
        };
        if size == 0 {
            return Err(anyhow!("Failed to get foreground window process"));
        } else {
            let data =
                String::from_utf16(&message_buffer[0..size as usize]).expect("Failed to unwrap");
            return Err(anyhow!("Failed to get foreground window process {data}"));
        }
    }
    let process_handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
            BOOL::from(false),
            id,
        )
    }
    .inspect_err(|e| error!("Failed to open process {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let exe_path = unsafe { get_process_path(process_handle, &mut text) }
        .inspect_err(|e| error!("Failed to get process path {e:?}"))?;

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    Ok(AppIdentity {
        app_name: app_name_from_path(&exe_path),
        app_id: exe_path.into(),
    })
}

unsafe fn get_process_path(window_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            window_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

pub fn get_idle_time() -> Result<u32> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        error!("Failed to retrieve user idle time");
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    let duration = tick_count - last.dwTime as u64;
    if duration > u32::MAX as u64 {
        Ok(u32::MAX)
    } else {
        Ok(duration as u32)
    }
}

pub struct WindowsFocusSampler {}

impl WindowsFocusSampler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsFocusSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusSampler for WindowsFocusSampler {
    fn sample(&mut self) -> Result<AppIdentity> {
        get_foreground_app().inspect_err(|e| error!("Failed to get foreground app {e:?}"))
    }

    fn idle_time_ms(&mut self) -> Result<u32> {
        get_idle_time().inspect_err(|e| error!("Failed to get idle time {e:?}"))
    }
}
