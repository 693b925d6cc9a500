pub use super::classification_rule::Entity as ClassificationRule;
pub use super::email_record::Entity as EmailRecord;
pub use super::mail_user::Entity as MailUser;
