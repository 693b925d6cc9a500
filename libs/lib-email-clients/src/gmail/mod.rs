pub mod api_quota;
pub mod system_labels;
