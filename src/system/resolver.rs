//! Tool discovery: resolves each [`ToolRole`] to an absolute executable path.

use crate::error::SwitchError;
use crate::models::ToolRole;
use std::path::{Path, PathBuf};

/// Looks up executables by name. Absence is a normal outcome, not an error.
pub trait CommandResolver {
    fn resolve(&self, command: &str) -> Option<PathBuf>;
}

/// PATH lookup equivalent to `which <command>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhichResolver;

impl CommandResolver for WhichResolver {
    fn resolve(&self, command: &str) -> Option<PathBuf> {
        which::which(command).ok()
    }
}

impl<F> CommandResolver for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn resolve(&self, command: &str) -> Option<PathBuf> {
        self(command)
    }
}

/// Resolved tool paths, one optional entry per role.
///
/// Built once when a controller is constructed and never modified after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    privilege_escalation: Option<PathBuf>,
    query_select: Option<PathBuf>,
    management_query: Option<PathBuf>,
    settings_launcher: Option<PathBuf>,
}

impl ToolSet {
    /// A tool set with nothing resolved.
    pub fn empty() -> Self {
        ToolSet::default()
    }

    /// Resolve every role, trying each candidate executable in order.
    ///
    /// Every missing role is logged once here; later lookups are silent.
    pub fn resolve(resolver: &dyn CommandResolver) -> Self {
        let mut tools = ToolSet::empty();

        for role in ToolRole::ALL {
            let found = role
                .candidates()
                .iter()
                .find_map(|candidate| resolver.resolve(candidate));

            match found {
                Some(path) => {
                    log::debug!("[Resolver] {} -> {}", role, path.display());
                    *tools.slot_mut(role) = Some(path);
                }
                None => {
                    let err = SwitchError::ToolUnavailable { role };
                    log::warn!("[Resolver] {}", err.user_message());
                }
            }
        }

        tools
    }

    /// Builder used by hosts that already know their tool paths.
    pub fn with(mut self, role: ToolRole, path: impl Into<PathBuf>) -> Self {
        *self.slot_mut(role) = Some(path.into());
        self
    }

    fn slot_mut(&mut self, role: ToolRole) -> &mut Option<PathBuf> {
        match role {
            ToolRole::PrivilegeEscalation => &mut self.privilege_escalation,
            ToolRole::QuerySelect => &mut self.query_select,
            ToolRole::ManagementQuery => &mut self.management_query,
            ToolRole::SettingsLauncher => &mut self.settings_launcher,
        }
    }

    /// Path for a role, if it was resolved.
    pub fn get(&self, role: ToolRole) -> Option<&Path> {
        match role {
            ToolRole::PrivilegeEscalation => self.privilege_escalation.as_deref(),
            ToolRole::QuerySelect => self.query_select.as_deref(),
            ToolRole::ManagementQuery => self.management_query.as_deref(),
            ToolRole::SettingsLauncher => self.settings_launcher.as_deref(),
        }
    }

    /// Path for a role as a command-line token.
    pub fn command(&self, role: ToolRole) -> Option<String> {
        self.get(role).map(|p| p.to_string_lossy().into_owned())
    }

    pub fn has(&self, role: ToolRole) -> bool {
        self.get(role).is_some()
    }

    /// Whether both tools needed for a switch are present.
    pub fn can_switch(&self) -> bool {
        self.has(ToolRole::PrivilegeEscalation) && self.has(ToolRole::QuerySelect)
    }

    /// Roles that could not be resolved.
    pub fn missing(&self) -> Vec<ToolRole> {
        ToolRole::ALL
            .into_iter()
            .filter(|role| !self.has(*role))
            .collect()
    }
}
