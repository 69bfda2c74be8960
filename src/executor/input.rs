// Physical input simulation into the remote session window.
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{PilotError, PilotResult};
use crate::executor::coordinator::InjectionPoint;
use crate::config::TimingConfig;
use crate::perception::window::{SessionWindow, WindowLocator};

/// The fixed key vocabulary the model may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    Enter,
    Windows,
}

impl FromStr for KeyName {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enter" => Ok(KeyName::Enter),
            "windows" => Ok(KeyName::Windows),
            _ => Err(PilotError::UnsupportedKey(s.to_string())),
        }
    }
}

impl KeyName {
    fn to_enigo(self) -> Key {
        match self {
            KeyName::Enter => Key::Return,
            KeyName::Windows => Key::Meta,
        }
    }
}

#[async_trait(?Send)]
pub trait InputInjector {
    /// Left click at a point relative to the session window.
    async fn click(&mut self, point: InjectionPoint) -> PilotResult<()>;
    /// Make the session window the keyboard target.
    async fn focus(&mut self) -> PilotResult<()>;
    /// Raw text into whatever has focus. Prefer [`InputInjector::focused_text`].
    async fn send_text(&mut self, text: &str) -> PilotResult<()>;
    /// Unsupported names fail with [`PilotError::UnsupportedKey`].
    async fn press_key(&mut self, key: &str) -> PilotResult<()>;
    /// Windows+R.
    async fn open_run_dialog(&mut self) -> PilotResult<()>;

    async fn focused_text(&mut self, text: &str) -> PilotResult<()> {
        self.focus().await?;
        self.send_text(text).await
    }

    async fn focused_key(&mut self, key: &str) -> PilotResult<()> {
        key.parse::<KeyName>()?;
        self.focus().await?;
        self.press_key(key).await
    }

    async fn focused_run_dialog(&mut self) -> PilotResult<()> {
        self.focus().await?;
        self.open_run_dialog().await
    }
}

/// Host-screen position of an injection-space point, against wherever the
/// window is right now.
fn screen_point(
    window: &impl WindowLocator,
    client_offset: (i32, i32),
    point: InjectionPoint,
) -> PilotResult<(i32, i32)> {
    let origin = window
        .origin()
        .map_err(|e| PilotError::Injection(format!("session window lost: {e}")))?
        .offset(client_offset.0, client_offset.1);
    Ok((origin.x + point.x, origin.y + point.y))
}

pub struct EnigoInjector {
    enigo: Enigo,
    window: SessionWindow,
    client_offset: (i32, i32),
    key_settle: Duration,
    focus_settle: Duration,
}

fn injection_err(what: &str) -> impl Fn(enigo::InputError) -> PilotError + '_ {
    move |e| PilotError::Injection(format!("{what}: {e:?}"))
}

impl EnigoInjector {
    /// `client_offset` is where (0, 0) of injection space sits inside the window.
    pub fn new(
        window: SessionWindow,
        client_offset: (i32, i32),
        timing: &TimingConfig,
    ) -> PilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| PilotError::Injection(format!("enigo init: {e:?}")))?;
        Ok(Self {
            enigo,
            window,
            client_offset,
            key_settle: timing.key_settle(),
            focus_settle: timing.focus_settle(),
        })
    }
}

#[async_trait(?Send)]
impl InputInjector for EnigoInjector {
    async fn click(&mut self, point: InjectionPoint) -> PilotResult<()> {
        let (sx, sy) = screen_point(&self.window, self.client_offset, point)?;
        let previous = self.enigo.location().ok();

        self.enigo
            .move_mouse(sx, sy, Coordinate::Abs)
            .map_err(injection_err("move"))?;
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(injection_err("mouse down"))?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.enigo
            .button(Button::Left, Direction::Release)
            .map_err(injection_err("mouse up"))?;

        // Hand the host cursor back where the operator left it.
        if let Some((px, py)) = previous {
            let _ = self.enigo.move_mouse(px, py, Coordinate::Abs);
        }
        tracing::debug!(x = sx, y = sy, "click injected");
        Ok(())
    }

    async fn focus(&mut self) -> PilotResult<()> {
        // Windows only hands the foreground to the sender of the last input.
        self.enigo
            .key(Key::Control, Direction::Click)
            .map_err(injection_err("ctrl"))?;
        self.window.raise()?;
        tokio::time::sleep(self.focus_settle).await;
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> PilotResult<()> {
        self.enigo.text(text).map_err(injection_err("text"))?;
        tokio::time::sleep(self.key_settle).await;
        tracing::debug!(chars = text.chars().count(), "text injected");
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> PilotResult<()> {
        let name: KeyName = key.parse()?;
        self.enigo
            .key(name.to_enigo(), Direction::Click)
            .map_err(injection_err("key"))?;
        tokio::time::sleep(self.key_settle).await;
        tracing::debug!(?name, "key injected");
        Ok(())
    }

    async fn open_run_dialog(&mut self) -> PilotResult<()> {
        self.enigo
            .key(Key::Meta, Direction::Press)
            .map_err(injection_err("windows down"))?;
        tokio::time::sleep(self.key_settle).await;
        let chord = self.enigo.key(Key::Unicode('r'), Direction::Click);
        tokio::time::sleep(self.key_settle).await;
        // Always release the modifier, even if the letter failed.
        let release = self.enigo.key(Key::Meta, Direction::Release);
        chord.map_err(injection_err("r"))?;
        release.map_err(injection_err("windows up"))?;
        Ok(())
    }
}
