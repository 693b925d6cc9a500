/// Quota units consumed per Gmail API call.
/// https://developers.google.com/gmail/api/reference/quota
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
};

/// Per-user quota units available each second
pub const GMAIL_QUOTA_PER_SECOND: usize = 250;
