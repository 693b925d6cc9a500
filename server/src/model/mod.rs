pub mod classification_rule;
pub mod email_record;
pub mod user;
