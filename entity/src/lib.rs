pub mod prelude;

pub mod classification_rule;
pub mod email_record;
pub mod mail_user;
pub mod sea_orm_active_enums;
