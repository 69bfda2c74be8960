//! The remote-session client window on the host desktop, looked up by title
//! each time it is needed so that moves and restores are followed.

use crate::errors::{PilotError, PilotResult};

/// Screen position of the session window's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOrigin {
    pub x: i32,
    pub y: i32,
}

impl WindowOrigin {
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Where the session window currently sits.
pub trait WindowLocator {
    fn origin(&self) -> PilotResult<WindowOrigin>;
}

fn title_matches(title: &str, minimized: bool, needle: &str) -> bool {
    !minimized && title.contains(needle)
}

#[derive(Debug, Clone)]
pub struct SessionWindow {
    title: String,
}

impl SessionWindow {
    /// Not finding the window at startup is fatal.
    pub fn attach(title: &str) -> PilotResult<Self> {
        let session = Self {
            title: title.to_string(),
        };
        let window = session.find()?;
        tracing::info!(
            title = %window.title(),
            x = window.x(),
            y = window.y(),
            "attached to session window"
        );
        Ok(session)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn find(&self) -> PilotResult<xcap::Window> {
        let windows = xcap::Window::all()
            .map_err(|e| PilotError::Capture(format!("enumerate windows: {e}")))?;
        windows
            .into_iter()
            .find(|w| title_matches(w.title(), w.is_minimized(), &self.title))
            .ok_or_else(|| {
                PilotError::Capture(format!("no visible window titled '*{}*'", self.title))
            })
    }

    /// Restore the window if minimised and make it the foreground window,
    /// so keyboard input lands in the session.
    pub fn raise(&self) -> PilotResult<()> {
        if foreground::raise(&self.title)? {
            tracing::trace!(title = %self.title, "session window raised");
            Ok(())
        } else {
            Err(PilotError::Injection(format!(
                "could not bring '*{}*' to the foreground",
                self.title
            )))
        }
    }
}

impl WindowLocator for SessionWindow {
    fn origin(&self) -> PilotResult<WindowOrigin> {
        let window = self.find()?;
        Ok(WindowOrigin {
            x: window.x(),
            y: window.y(),
        })
    }
}

#[cfg(windows)]
mod foreground {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextW, IsIconic, IsWindowVisible, SetForegroundWindow,
        ShowWindow, SW_RESTORE,
    };

    use crate::errors::{PilotError, PilotResult};

    struct Search {
        needle: String,
        found: Option<HWND>,
    }

    unsafe extern "system" fn visit(hwnd: HWND, lparam: LPARAM) -> BOOL {
        // SAFETY: lparam is the &mut Search handed to EnumWindows below and
        // outlives the enumeration.
        let search = unsafe { &mut *(lparam.0 as *mut Search) };
        let mut buf = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
        if len > 0 {
            let title = String::from_utf16_lossy(&buf[..len as usize]);
            let usable =
                unsafe { IsWindowVisible(hwnd).as_bool() || IsIconic(hwnd).as_bool() };
            if usable && title.contains(&search.needle) {
                search.found = Some(hwnd);
                return BOOL(0);
            }
        }
        BOOL(1)
    }

    pub fn raise(title: &str) -> PilotResult<bool> {
        let mut search = Search {
            needle: title.to_string(),
            found: None,
        };
        // EnumWindows reports an error when the callback stops it early.
        let _ = unsafe { EnumWindows(Some(visit), LPARAM(&mut search as *mut Search as isize)) };
        let Some(hwnd) = search.found else {
            return Err(PilotError::Injection(format!("no window titled '*{title}*'")));
        };
        unsafe {
            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            Ok(SetForegroundWindow(hwnd).as_bool())
        }
    }
}

#[cfg(not(windows))]
mod foreground {
    use crate::errors::{PilotError, PilotResult};

    pub fn raise(title: &str) -> PilotResult<bool> {
        Err(PilotError::Injection(format!(
            "cannot raise '*{title}*': foreground control needs a Windows host"
        )))
    }
}
