//! Well-known names shared between the agent loop and the task templates.

/// Prefix of every node annotation Steward reads or writes.
pub const ANNOTATION_PREFIX: &str = "steward.io";

/// Annotation carrying the id of the requested maintenance operation.
pub const ANNOTATION_OPERATION_ID: &str = "steward.io/operation-id";

/// Annotation carrying the request status (`pending`, `running`, ...).
pub const ANNOTATION_STATUS: &str = "steward.io/status";

/// Annotation carrying the requested Kubernetes version.
pub const ANNOTATION_TARGET_VERSION: &str = "steward.io/target-version";

/// Annotation carrying a comma separated list of extra components.
pub const ANNOTATION_COMPONENTS: &str = "steward.io/components";

/// Node label marking control-plane nodes.
pub const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";

/// Legacy node label marking control-plane nodes.
pub const LABEL_MASTER: &str = "node-role.kubernetes.io/master";

/// ConfigMap label marking an etcd backup request.
pub const LABEL_BACKUP_REQUEST: &str = "steward.io/backup";

/// Default directory holding plan journals.
pub const DEFAULT_JOURNAL_DIR: &str = "/var/lib/steward";
