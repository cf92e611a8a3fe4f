use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of an event stream (one aggregate instance).
    ///
    /// Carts use their owner's id as the stream id, so each user has exactly
    /// one cart stream; orders get a fresh random id per checkout.
    AggregateId
);

uuid_id!(
    /// Identifier of an authenticated user, as resolved by the authenticator.
    UserId
);

impl AggregateId {
    /// Returns the cart stream id owned by `user`.
    pub fn cart_of(user: UserId) -> Self {
        Self(user.as_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(AggregateId::new(), AggregateId::new());
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn cart_stream_is_stable_per_user() {
        let user = UserId::new();
        assert_eq!(AggregateId::cart_of(user), AggregateId::cart_of(user));
        assert_eq!(AggregateId::cart_of(user).as_uuid(), user.as_uuid());
        assert_ne!(AggregateId::cart_of(user), AggregateId::cart_of(UserId::new()));
    }

    #[test]
    fn user_id_parses_from_str() {
        let uuid = Uuid::new_v4();
        let parsed: UserId = uuid.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), uuid);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn user_id_serializes_transparently() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
