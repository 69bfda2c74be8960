//! App-install test: a fixed macro around one decision-driven phase that
//! clicks through the installer.

use std::collections::HashMap;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::state::TaskOutcome;
use crate::config::AppEntry;

/// Built-in short names: (name, winget package id, Start-menu shortcut).
const BUILTIN_APPS: &[(&str, &str, &str)] = &[
    ("vscode", "Microsoft.VisualStudioCode", "Visual Studio Code"),
    ("chrome", "Google.Chrome", "Google Chrome"),
    ("firefox", "Mozilla.Firefox", "Mozilla Firefox"),
    ("notepad++", "Notepad++.Notepad++", "Notepad++"),
    ("7zip", "7zip.7zip", "7-Zip"),
    ("vlc", "VideoLAN.VLC", "VLC Media Player"),
    ("git", "Git.Git", "Git"),
    ("python", "Python.Python.3.11", "Python 3.11"),
    ("nodejs", "OpenJS.NodeJS", "Node.js"),
    ("steam", "Valve.Steam", "Steam"),
    ("spotify", "Spotify.Spotify", "Spotify"),
    ("discord", "Discord.Discord", "Discord"),
    ("slack", "SlackTechnologies.Slack", "Slack"),
    ("zoom", "Zoom.Zoom", "Zoom"),
    ("obs", "OBSProject.OBSStudio", "OBS Studio"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApp {
    pub package_id: String,
    pub shortcut_name: String,
    /// False when the name was passed through as a best-effort package id.
    pub known: bool,
}

#[derive(Debug, Clone)]
pub struct AppCatalog {
    /// Keyed by lowercase short name.
    entries: HashMap<String, (String, String)>,
}

impl AppCatalog {
    pub fn builtin() -> Self {
        Self::with_entries(&[])
    }

    /// Built-in table with `extra` layered on top.
    pub fn with_entries(extra: &[AppEntry]) -> Self {
        let mut entries: HashMap<String, (String, String)> = BUILTIN_APPS
            .iter()
            .map(|(name, id, shortcut)| (name.to_string(), (id.to_string(), shortcut.to_string())))
            .collect();
        for app in extra {
            entries.insert(
                app.name.to_lowercase(),
                (app.package_id.clone(), app.shortcut_name.clone()),
            );
        }
        Self { entries }
    }

    pub fn resolve(&self, name: &str) -> ResolvedApp {
        let name = name.trim();
        match self.entries.get(&name.to_lowercase()) {
            Some((id, shortcut)) => ResolvedApp {
                package_id: id.clone(),
                shortcut_name: shortcut.clone(),
                known: true,
            },
            None => ResolvedApp {
                package_id: name.to_string(),
                shortcut_name: name.to_string(),
                known: false,
            },
        }
    }
}

pub fn install_command(package_id: &str) -> String {
    format!("winget install --accept-source-agreements {package_id}")
}

pub fn installer_instruction(shortcut_name: &str) -> String {
    format!(
        "Run through the application installer by clicking next, yes, Ok, or whatever is appropriate to move to the next step. \
         Do not click 'No' or 'Cancel' or just hit the enter key. If you do, the installer will exit and the task will fail. \
         If it looks like the installer is working and we should wait, respond with 'task_wait'. \
         When it looks like the installation is complete, respond with 'task_complete'. You can tell if this installation is completed \
         by looking for the {shortcut_name} icon on the desktop, or not seeing any more installer steps."
    )
}

impl AgentEngine {
    pub(super) async fn handle_app_install(&mut self, cmd: &str) {
        if cmd.eq_ignore_ascii_case("revert") {
            self.revert_vm().await;
            return;
        }
        let app = self.catalog.resolve(cmd);
        self.install_app(cmd, &app).await;
    }

    async fn revert_vm(&mut self) {
        self.say("Reverting VM to previous snapshot...");
        let snapshot = self.revert_snapshot.clone();
        match self.vm.restore_snapshot(&snapshot).await {
            Ok(()) => self.say("VM reverted successfully"),
            Err(e) => {
                tracing::error!(error = %e, snapshot = %snapshot, "snapshot restore failed");
                self.say(&format!("Error: VM revert failed: {e}"));
            }
        }
    }

    async fn install_app(&mut self, name: &str, app: &ResolvedApp) {
        if app.known {
            self.say(&format!(
                "Installing {} using package ID: {}",
                app.shortcut_name, app.package_id
            ));
        } else {
            self.say(&format!("Installing package: {name}"));
        }
        tracing::info!(package = %app.package_id, known = app.known, "install test started");

        self.say("Opening Run Dialog");
        let r = self.injector.focused_run_dialog().await;
        self.report(r, "opening the run dialog");
        self.run_for(self.timing.dialog_wait()).await;
        let r = self.injector.focused_text("cmd").await;
        self.report(r, "typing cmd");
        let r = self.injector.focused_key("enter").await;
        self.report(r, "pressing enter");
        self.run_for(self.timing.dialog_wait()).await;

        self.say("Kicking off winget install");
        let r = self.injector.focused_text(&install_command(&app.package_id)).await;
        self.report(r, "typing the install command");
        let r = self.injector.focused_key("enter").await;
        self.report(r, "pressing enter");
        self.run_for(self.timing.install_wait()).await;

        self.say("AI Driving through installer");
        let outcome = self.do_task(&installer_instruction(&app.shortcut_name)).await;
        tracing::info!(?outcome, package = %app.package_id, "installer phase finished");
        if let TaskOutcome::Aborted { reason } = outcome {
            self.say(&format!("Test aborted: {reason}"));
            return;
        }

        self.say("Installation complete, launching application");
        let r = self.injector.focused_key("windows").await;
        self.report(r, "opening the start menu");
        let r = self.injector.focused_text(&app.shortcut_name).await;
        self.report(r, "typing the shortcut name");
        let r = self.injector.focused_key("enter").await;
        self.report(r, "pressing enter");
        self.run_for(self.timing.dialog_wait()).await;
        self.say("Test complete");
    }
}
