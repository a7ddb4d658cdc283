use crate::merge::record::Record;
use crate::merge::util::camel_to_kebab;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Collection,
    Singleton,
    Passthrough,
}

// Ordering is by declaration, then by name for `Other`; output file order relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Tweets,
    Like,
    Follower,
    Following,
    DirectMessages,
    DirectMessagesGroup,
    Profile,
    Account,
    AgeInfo,
    AccountTimezone,
    AccountCreationIp,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub tag: &'static str,
    pub key_field: &'static str,
}

impl DataType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "tweets" => Self::Tweets,
            "like" => Self::Like,
            "follower" => Self::Follower,
            "following" => Self::Following,
            "directMessages" => Self::DirectMessages,
            "directMessagesGroup" => Self::DirectMessagesGroup,
            "profile" => Self::Profile,
            "account" => Self::Account,
            "ageinfo" => Self::AgeInfo,
            "accountTimezone" => Self::AccountTimezone,
            "accountCreationIp" => Self::AccountCreationIp,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Tweets => "tweets",
            Self::Like => "like",
            Self::Follower => "follower",
            Self::Following => "following",
            Self::DirectMessages => "directMessages",
            Self::DirectMessagesGroup => "directMessagesGroup",
            Self::Profile => "profile",
            Self::Account => "account",
            Self::AgeInfo => "ageinfo",
            Self::AccountTimezone => "accountTimezone",
            Self::AccountCreationIp => "accountCreationIp",
            Self::Other(name) => name,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Tweets
            | Self::Like
            | Self::Follower
            | Self::Following
            | Self::DirectMessages
            | Self::DirectMessagesGroup => RecordKind::Collection,
            Self::Profile
            | Self::Account
            | Self::AgeInfo
            | Self::AccountTimezone
            | Self::AccountCreationIp => RecordKind::Singleton,
            Self::Other(_) => RecordKind::Passthrough,
        }
    }

    pub fn schema(&self) -> Option<RecordSchema> {
        let (tag, key_field) = match self {
            Self::Tweets => ("tweet", "id_str"),
            Self::Like => ("like", "tweetId"),
            Self::Follower => ("follower", "accountId"),
            Self::Following => ("following", "accountId"),
            Self::DirectMessages | Self::DirectMessagesGroup => {
                ("dmConversation", "conversationId")
            }
            _ => return None,
        };
        Some(RecordSchema { tag, key_field })
    }

    /// `None` when the type has no identity, the record lacks the key field, or it arrived
    /// under an unexpected envelope; such records are always kept.
    pub fn identity_key(&self, record: &Record) -> Option<String> {
        let schema = self.schema()?;
        if record.tag().is_some_and(|tag| tag != schema.tag) {
            return None;
        }
        record.field_str(schema.key_field)
    }

    pub fn is_media_registry(&self) -> bool {
        matches!(self, Self::Other(name) if name.ends_with("Media"))
    }

    pub fn media_registry_name(&self) -> String {
        format!("{}Media", self.name())
    }

    pub fn media_owner(&self) -> DataType {
        match self {
            Self::Other(name) if self.is_media_registry() => {
                let base = &name[..name.len() - "Media".len()];
                if base.is_empty() {
                    self.clone()
                } else {
                    DataType::from_name(base)
                }
            }
            _ => self.clone(),
        }
    }

    pub fn output_file_name(&self) -> String {
        format!("data/{}.js", camel_to_kebab(self.name()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
