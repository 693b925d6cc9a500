//! Well-known Gmail system label ids that carry message flags.

pub const UNREAD: &str = "UNREAD";
pub const STARRED: &str = "STARRED";
pub const IMPORTANT: &str = "IMPORTANT";
pub const SENT: &str = "SENT";
pub const DRAFT: &str = "DRAFT";
pub const TRASH: &str = "TRASH";
pub const INBOX: &str = "INBOX";

pub fn has_label(label_ids: &[String], label: &str) -> bool {
    label_ids.iter().any(|l| l == label)
}
