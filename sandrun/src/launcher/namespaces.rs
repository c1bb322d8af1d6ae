//! Namespace set construction and policy (§4.4.1, §8 "Namespace set").

use std::path::PathBuf;

use oci_spec::runtime::{LinuxNamespaceType, Spec};

use crate::config::{NetworkMode, Platform, SandboxConfig};
use crate::constants::NOBODY_ID;

/// One namespace kind the sandbox enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsKind {
    Ipc,
    Uts,
    Mount,
    Pid,
    Network,
    User,
}

/// Either create a fresh namespace of this kind, or join an existing one
/// referenced by a `/proc/<pid>/ns/<kind>`-style path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NsSpec {
    New(NsKind),
    Join(NsKind, PathBuf),
}

/// A single `inside_id host_id size` row, as written to `uid_map`/`gid_map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    pub container_id: u32,
    pub host_id: u32,
    pub size: u32,
}

/// What to do about credentials once the namespace set is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNsPolicy {
    /// New user namespace mapping the fixed "nobody" id to itself on the
    /// host, then dropping credentials to that principal.
    NewNobody,
    /// Joined the spec-referenced user namespace with its own mappings;
    /// the sandbox should be told to apply host capabilities.
    JoinWithCaps {
        uid_mappings: Vec<IdMapping>,
        gid_mappings: Vec<IdMapping>,
    },
}

/// The complete namespace plan for one Create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePlan {
    pub specs: Vec<NsSpec>,
    pub user_policy: UserNsPolicy,
}

impl NamespacePlan {
    /// Whether the plan passes `--apply-caps=true` to the sandbox (§4.4.1,
    /// §6: only set when joining the caller's own user namespace under
    /// host networking).
    pub fn apply_caps(&self) -> bool {
        matches!(self.user_policy, UserNsPolicy::JoinWithCaps { .. })
    }

    /// Specs ordered for entry in the pre-exec hook: the user namespace
    /// must be entered (joined or created) before any other namespace
    /// that a freshly-dropped "nobody" would no longer have the
    /// capabilities to create. Once inside a *new* user namespace the
    /// process holds a full capability set within it, which is exactly
    /// what lets an unprivileged caller still unshare IPC/UTS/mount/PID/
    /// network afterwards.
    pub fn ordered_for_exec(&self) -> Vec<&NsSpec> {
        let mut user: Vec<&NsSpec> = Vec::new();
        let mut rest: Vec<&NsSpec> = Vec::new();
        for spec in &self.specs {
            let kind = match spec {
                NsSpec::New(k) | NsSpec::Join(k, _) => *k,
            };
            if kind == NsKind::User {
                user.push(spec);
            } else {
                rest.push(spec);
            }
        }
        user.into_iter().chain(rest).collect()
    }
}

fn spec_namespace_path(spec: &Spec, kind: LinuxNamespaceType) -> Option<PathBuf> {
    let ns = spec
        .linux()
        .as_ref()?
        .namespaces()
        .as_ref()?
        .iter()
        .find(|ns| ns.typ() == kind)?;
    ns.path().clone()
}

fn has_namespace(spec: &Spec, kind: LinuxNamespaceType) -> bool {
    spec.linux()
        .as_ref()
        .and_then(|l| l.namespaces().as_ref())
        .map(|nss| nss.iter().any(|ns| ns.typ() == kind))
        .unwrap_or(false)
}

fn spec_id_mappings(spec: &Spec) -> (Vec<IdMapping>, Vec<IdMapping>) {
    let linux = match spec.linux().as_ref() {
        Some(l) => l,
        None => return (Vec::new(), Vec::new()),
    };
    let to_mappings = |m: &[oci_spec::runtime::LinuxIdMapping]| {
        m.iter()
            .map(|m| IdMapping {
                container_id: m.container_id(),
                host_id: m.host_id(),
                size: m.size(),
            })
            .collect()
    };
    let uid = linux
        .uid_mappings()
        .as_ref()
        .map(|m| to_mappings(m))
        .unwrap_or_default();
    let gid = linux
        .gid_mappings()
        .as_ref()
        .map(|m| to_mappings(m))
        .unwrap_or_default();
    (uid, gid)
}

/// Build the namespace plan per §4.4.1.
///
/// IPC, UTS and mount namespaces are always freshly created — the sandbox
/// virtualizes these internally, so the host's real ones must not leak in.
/// PID is new unless the platform's tracing mechanism needs the sandbox to
/// see the host's process tree. Network and user namespace policy follow
/// the table in §4.4.1 exactly.
pub fn build_plan(config: &SandboxConfig, spec: &Spec) -> NamespacePlan {
    let mut specs = vec![
        NsSpec::New(NsKind::Ipc),
        NsSpec::New(NsKind::Uts),
        NsSpec::New(NsKind::Mount),
    ];

    if config.platform.requires_current_pid_namespace() {
        tracing::warn!("sandbox will run in the current PID namespace (platform requires it)");
    } else {
        specs.push(NsSpec::New(NsKind::Pid));
    }

    if let Some(path) = spec_namespace_path(spec, LinuxNamespaceType::Network) {
        if config.network != NetworkMode::None {
            specs.push(NsSpec::Join(NsKind::Network, path));
        } else {
            specs.push(NsSpec::New(NsKind::Network));
        }
    } else {
        specs.push(NsSpec::New(NsKind::Network));
    }

    let user_policy = if config.network == NetworkMode::Host && has_namespace(spec, LinuxNamespaceType::User)
    {
        if let Some(path) = spec_namespace_path(spec, LinuxNamespaceType::User) {
            specs.push(NsSpec::Join(NsKind::User, path));
        } else {
            specs.push(NsSpec::New(NsKind::User));
        }
        let (uid_mappings, gid_mappings) = spec_id_mappings(spec);
        UserNsPolicy::JoinWithCaps {
            uid_mappings,
            gid_mappings,
        }
    } else {
        specs.push(NsSpec::New(NsKind::User));
        UserNsPolicy::NewNobody
    };

    NamespacePlan { specs, user_policy }
}

/// The fixed nobody/nobody mapping used by [`UserNsPolicy::NewNobody`]
/// (§8 "Credential mapping": id 65534 <-> 65534, size 1, both UID and GID).
pub fn nobody_mapping() -> IdMapping {
    IdMapping {
        container_id: NOBODY_ID,
        host_id: NOBODY_ID,
        size: 1,
    }
}

/// Platform-independent check used by the caller: does this plan want a
/// device FD donated (C3)? Kept here since it's namespace-adjacent policy,
/// not FD-table bookkeeping.
pub fn wants_device(platform: Platform) -> bool {
    platform.needs_device()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestModeFlags;
    use std::path::PathBuf;

    fn config(platform: Platform, network: NetworkMode) -> SandboxConfig {
        SandboxConfig {
            platform,
            network,
            log_file: None,
            debug_log_dir: None,
            spec_file: PathBuf::from("/bundle/config.json"),
            bundle_dir: PathBuf::from("/bundle"),
            binary_path: None,
            console_socket: None,
            device_path: None,
            test_mode: TestModeFlags::default(),
        }
    }

    #[test]
    fn always_includes_ipc_uts_mount() {
        let spec = Spec::default();
        let plan = build_plan(&config(Platform::Accelerator, NetworkMode::None), &spec);
        assert!(plan.specs.contains(&NsSpec::New(NsKind::Ipc)));
        assert!(plan.specs.contains(&NsSpec::New(NsKind::Uts)));
        assert!(plan.specs.contains(&NsSpec::New(NsKind::Mount)));
    }

    #[test]
    fn pid_absent_exactly_for_tracing_platform() {
        let spec = Spec::default();
        let traced = build_plan(&config(Platform::Ptrace, NetworkMode::None), &spec);
        assert!(!traced.specs.contains(&NsSpec::New(NsKind::Pid)));

        let accel = build_plan(&config(Platform::Accelerator, NetworkMode::None), &spec);
        assert!(accel.specs.contains(&NsSpec::New(NsKind::Pid)));
    }

    #[test]
    fn user_namespace_is_new_without_host_network() {
        let spec = Spec::default();
        let plan = build_plan(&config(Platform::Accelerator, NetworkMode::None), &spec);
        assert!(plan.specs.contains(&NsSpec::New(NsKind::User)));
        assert_eq!(plan.user_policy, UserNsPolicy::NewNobody);
        assert!(!plan.apply_caps());
    }

    #[test]
    fn nobody_mapping_is_65534() {
        let m = nobody_mapping();
        assert_eq!(m.container_id, 65534);
        assert_eq!(m.host_id, 65534);
        assert_eq!(m.size, 1);
    }

    #[test]
    fn host_network_joins_user_namespace_even_without_a_path() {
        use oci_spec::runtime::{LinuxBuilder, LinuxNamespaceBuilder};

        // A user-namespace entry with no `path` is a legal OCI spec shape
        // meaning "create new" rather than "absent". Host networking must
        // still record a `NsKind::User` entry in this case, matching the
        // `else` arm below it, so `apply_join_credentials` always has a
        // namespace op to act on.
        let user_ns = LinuxNamespaceBuilder::default()
            .typ(LinuxNamespaceType::User)
            .build()
            .unwrap();
        let linux = LinuxBuilder::default()
            .namespaces(vec![user_ns])
            .build()
            .unwrap();
        let spec = oci_spec::runtime::SpecBuilder::default()
            .linux(linux)
            .build()
            .unwrap();

        let plan = build_plan(&config(Platform::Accelerator, NetworkMode::Host), &spec);
        assert!(
            plan.specs
                .iter()
                .any(|s| matches!(s, NsSpec::New(NsKind::User)) || matches!(s, NsSpec::Join(NsKind::User, _)))
        );
        assert!(plan.apply_caps());
    }
}
