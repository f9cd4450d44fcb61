/// Fixed committer identity (§6: "Identity for committer is set process-wide
/// with a fixed name/email").
pub const COMMITTER_NAME: &str = "Config History";
pub const COMMITTER_EMAIL: &str = "confsnap@localhost";
