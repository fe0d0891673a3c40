//! Property-based tests for room token derivation and login pairing.
//!
//! Uses proptest to verify:
//! 1. Token derivation is a pure function of its inputs.
//! 2. Changing the password for a fixed secret changes the token.
//! 3. Two correct logins always land in the same room; a wrong one never does.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use rendezvous_relay::registry::{ConnectionId, Registry, RegistryError};

proptest! {
    #[test]
    fn derive_token_is_pure(secret in ".{0,64}", password in ".{0,64}") {
        let registry = Registry::new(b"props");
        prop_assert_eq!(
            registry.derive_token(&secret, &password),
            registry.derive_token(&secret, &password)
        );
        // A second registry with the same process secret agrees.
        let other = Registry::new(b"props");
        prop_assert_eq!(
            registry.derive_token(&secret, &password),
            other.derive_token(&secret, &password)
        );
    }

    #[test]
    fn different_password_different_token(
        secret in ".{0,32}",
        a in ".{0,32}",
        b in ".{0,32}",
    ) {
        prop_assume!(a != b);
        let registry = Registry::new(b"props");
        prop_assert_ne!(
            registry.derive_token(&secret, &a),
            registry.derive_token(&secret, &b)
        );
    }

    #[test]
    fn correct_pair_shares_room_wrong_password_does_not(
        secret in "[a-z0-9]{1,16}",
        password in "[a-z0-9]{1,16}",
        wrong in "[a-z0-9]{1,16}",
    ) {
        prop_assume!(password != wrong);
        let registry = Registry::new(b"props");
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        let t1 = registry.login(&secret, &password, first).unwrap();
        prop_assert_eq!(
            registry.login(&secret, &wrong, ConnectionId::new()),
            Err(RegistryError::WrongPassword)
        );
        let t2 = registry.login(&secret, &password, second).unwrap();

        prop_assert_eq!(&t1, &t2);
        prop_assert_eq!(registry.room_of(&t1), Some(vec![first, second]));
    }
}
