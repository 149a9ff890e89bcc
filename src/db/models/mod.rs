//! Marketplace models split into entity modules.

pub mod booking;
pub mod category;
pub mod labour;
pub mod referral;
pub mod user;

pub use booking::*;
pub use category::*;
pub use labour::*;
pub use referral::*;
pub use user::*;

use serde::{Deserialize, Deserializer};

/// Deserialize a field that may be absent, `null`, or a value.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent stays `None`, `null` becomes `Some(None)`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query string of the admin list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// Response body for delete endpoints
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct AddressPatch {
        #[serde(default, deserialize_with = "nullable")]
        address: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_three_states() {
        let absent: AddressPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.address, None);

        let cleared: AddressPatch = serde_json::from_str(r#"{"address": null}"#).unwrap();
        assert_eq!(cleared.address, Some(None));

        let set: AddressPatch = serde_json::from_str(r#"{"address": "House 4"}"#).unwrap();
        assert_eq!(set.address, Some(Some("House 4".to_string())));
    }
}
