//! Administrator ClusterRoleBindings on the SKR
//!
//! Every administrator of a runtime gets a `cluster-admin` binding. Bindings
//! the manager created earlier for users who are no longer administrators are
//! removed; bindings it did not create are never touched.

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;

use kim_common::labels;

const CLUSTER_ADMIN: &str = "cluster-admin";
const CLUSTER_ROLE: &str = "ClusterRole";
const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const USER: &str = "User";

/// Name prefix of generated administrator bindings
pub const ADMIN_GENERATE_NAME: &str = "admin-";

/// Bindings to delete and bindings to create
#[derive(Debug, Default)]
pub struct CrbDiff {
    /// Managed bindings without any current administrator
    pub removed: Vec<ClusterRoleBinding>,
    /// One binding per administrator not bound yet
    pub missing: Vec<ClusterRoleBinding>,
}

fn is_managed(crb: &ClusterRoleBinding) -> bool {
    crb.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(labels::CRB_MANAGED_BY))
        .is_some_and(|v| v == labels::MANAGED_BY_VALUE)
}

fn binds_cluster_admin(crb: &ClusterRoleBinding) -> bool {
    crb.role_ref.kind == CLUSTER_ROLE && crb.role_ref.name == CLUSTER_ADMIN
}

fn user_subjects(crb: &ClusterRoleBinding) -> impl Iterator<Item = &str> {
    crb.subjects
        .iter()
        .flatten()
        .filter(|s| s.kind == USER)
        .map(|s| s.name.as_str())
}

/// Compare the administrators of a runtime with the bindings on its cluster
pub fn diff(admins: &[String], crbs: &[ClusterRoleBinding]) -> CrbDiff {
    let removed = crbs
        .iter()
        .filter(|crb| {
            is_managed(crb)
                && binds_cluster_admin(crb)
                && user_subjects(crb).next().is_some()
                && !crb
                    .subjects
                    .iter()
                    .flatten()
                    .any(|s| admins.contains(&s.name))
        })
        .cloned()
        .collect();

    let missing = admins
        .iter()
        .filter(|admin| {
            !crbs
                .iter()
                .any(|crb| user_subjects(crb).any(|name| name == admin.as_str()))
        })
        .map(|admin| admin_binding(admin))
        .collect();

    CrbDiff { removed, missing }
}

/// A managed `cluster-admin` binding for one user
pub fn admin_binding(user: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            generate_name: Some(ADMIN_GENERATE_NAME.to_string()),
            labels: Some(BTreeMap::from([(
                labels::CRB_MANAGED_BY.to_string(),
                labels::MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: CLUSTER_ROLE.to_string(),
            name: CLUSTER_ADMIN.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_GROUP.to_string()),
            kind: USER.to_string(),
            name: user.to_string(),
            namespace: None,
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(name: &str, subject_kind: &str, user: &str, managed: bool) -> ClusterRoleBinding {
        let mut crb = admin_binding(user);
        crb.metadata.generate_name = None;
        crb.metadata.name = Some(name.to_string());
        if !managed {
            crb.metadata.labels = None;
        }
        if let Some(subjects) = crb.subjects.as_mut() {
            subjects[0].kind = subject_kind.to_string();
        }
        crb
    }

    fn admins(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn new_administrators_get_one_binding_each() {
        let diff = diff(&admins(&["a@x.com", "b@x.com"]), &[]);

        assert!(diff.removed.is_empty());
        assert_eq!(diff.missing.len(), 2);
        let crb = &diff.missing[0];
        assert_eq!(crb.metadata.generate_name.as_deref(), Some("admin-"));
        assert_eq!(crb.role_ref.name, "cluster-admin");
        assert_eq!(crb.subjects.as_ref().unwrap()[0].name, "a@x.com");
    }

    #[test]
    fn dropped_administrator_loses_only_their_binding() {
        let crbs = vec![
            existing("admin-a", USER, "a@x.com", true),
            existing("admin-b", USER, "b@x.com", true),
        ];

        let diff = diff(&admins(&["a@x.com"]), &crbs);

        assert!(diff.missing.is_empty());
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].metadata.name.as_deref(), Some("admin-b"));
    }

    #[test]
    fn unmanaged_and_service_account_bindings_are_kept() {
        let crbs = vec![
            existing("manual", USER, "old@x.com", false),
            existing("sa", "ServiceAccount", "robot", true),
        ];

        let diff = diff(&admins(&[]), &crbs);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn non_admin_role_is_kept() {
        let mut crb = existing("viewer", USER, "old@x.com", true);
        crb.role_ref.name = "view".to_string();

        let diff = diff(&admins(&[]), &[crb]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn administrator_bound_by_unmanaged_binding_is_not_duplicated() {
        let crbs = vec![existing("manual", USER, "a@x.com", false)];
        let diff = diff(&admins(&["a@x.com"]), &crbs);
        assert!(diff.missing.is_empty());
    }
}
