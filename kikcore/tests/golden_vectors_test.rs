//! Fixed-input, fixed-output checks for every derivation the server verifies.

use std::collections::BTreeMap;

use kikcore::bits::DigestAlgorithm;
use kikcore::credentials::password_key;
use kikcore::handshake::{HandshakeSigner, kik_timestamp};
use kikcore::shuffle::{ShuffleMode, map_hash_code, shuffle};
use kikcore::verification::DeviceVerifier;
use kikcore::version::{default_version, find_version};

const KEY: &str = include_str!("fixtures/handshake_key.pem");

#[test]
fn password_keys() {
    assert_eq!(password_key("tester", "password123"), "f21bd0af7d1a97b50635c1dc3967f6fd");
    assert_eq!(password_key("Alice.Smith", "hunter2"), "f21886ef5c835a541e889f626027b098");
    assert_eq!(
        password_key("someone@example.com", "correct horse"),
        "284d7dbc62fcab5609d6793bdd707875"
    );
}

#[test]
fn device_tokens_and_cv() {
    let verifier = DeviceVerifier::new(default_version());
    assert_eq!(verifier.token(), "9iI2KN2xuVp1668xfwU0kt1WXWw=");
    assert_eq!(
        verifier.cv("1700000000123", "foo_ab1@talk.kik.com"),
        "cc322ed49412d9d04aca9e80df6d5a3cee486272"
    );

    let older = DeviceVerifier::new(find_version("14.0.0.11130").unwrap());
    assert_eq!(older.token(), "WElGw8ZQZIJd5x+UibcsUYV4BKY=");
}

#[test]
fn timestamps() {
    assert_eq!(kik_timestamp(1_700_000_000_000), 1_700_000_000_131);
    assert_eq!(kik_timestamp(1_719_500_123_456), 1_719_500_123_590);
    assert_eq!(kik_timestamp(1), 1);
    assert_eq!(kik_timestamp(0xFF_FFFF), 16_777_153);
}

#[test]
fn folded_digests() {
    assert_eq!(DigestAlgorithm::Sha256.hash_code(b"abc"), 566_226_761);
    assert_eq!(DigestAlgorithm::Sha1.hash_code(b"abc"), -4_413_008);
    assert_eq!(DigestAlgorithm::Md5.hash_code(b"abc"), 13_138);
}

fn anonymous_map() -> Vec<(&'static str, &'static str)> {
    vec![
        ("signed", "SIG"),
        ("lang", "en_US"),
        ("sid", "a5f0e1c2-7d3b-4e9a-b1c6-0f2e3d4c5b6a"),
        ("anon", "1"),
        ("ts", "1700000000123"),
        ("v", "15.25.0.22493"),
        ("cv", "0123456789abcdef0123456789abcdef01234567"),
        ("conn", "WIFI"),
        ("dev", "CAN0123456789abcdef0123456789abcdef"),
    ]
}

fn authenticated_map() -> Vec<(&'static str, &'static str)> {
    vec![
        ("from", "foo_ab1@talk.kik.com/CANdev1"),
        ("to", "talk.kik.com"),
        ("p", "00112233445566778899aabbccddeeff"),
        ("cv", "cv"),
        ("v", "15.25.0.22493"),
        ("sid", "sid-2"),
        ("n", "1"),
        ("conn", "WIFI"),
        ("ts", "1700000000123"),
        ("lang", "en_US"),
        ("signed", "SIG"),
    ]
}

fn keys(ordered: &[(String, String)]) -> Vec<&str> {
    ordered.iter().map(|(k, _)| k.as_str()).collect()
}

#[test]
fn map_hash_codes() {
    let anon: BTreeMap<String, String> = anonymous_map()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(map_hash_code(&anon, ShuffleMode::Anonymous), 701_062_471);

    let auth: BTreeMap<String, String> = authenticated_map()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(map_hash_code(&auth, ShuffleMode::Authenticated), -752_698_237);
}

#[test]
fn shuffled_orders() {
    assert_eq!(
        keys(&shuffle(anonymous_map(), ShuffleMode::Anonymous)),
        ["conn", "lang", "dev", "anon", "v", "cv", "sid", "signed", "ts"]
    );
    assert_eq!(
        keys(&shuffle(anonymous_map(), ShuffleMode::Authenticated)),
        ["v", "anon", "sid", "cv", "conn", "ts", "dev", "signed", "lang"]
    );
    assert_eq!(
        keys(&shuffle(authenticated_map(), ShuffleMode::Authenticated)),
        ["sid", "n", "conn", "cv", "signed", "to", "lang", "p", "v", "from", "ts"]
    );
}

#[test]
fn shuffle_is_repeatable() {
    let first = shuffle(authenticated_map(), ShuffleMode::Authenticated);
    let second = shuffle(authenticated_map(), ShuffleMode::Authenticated);
    assert_eq!(first, second);
}

#[test]
fn rsa_signature() {
    let signer = HandshakeSigner::from_pem(KEY).unwrap();
    assert_eq!(
        signer.sign("CAN0123:15.25.0.22493:1700000000123:sid-1"),
        "T5UQgNULu6wvDsmfEtLf2R2hKHGHCtcs37EYwf0JCp9BfFn_oDEW82eWeA3gjLL7Jyf7NOanY716GTtQs5SRmHQ7c22Uh6KKY_o4KgAR0V9H7og3x4B_-tyQYHnqgVojE3fXqdXy28qL821RdIEeIy3EXF5zxFl03rarP_MUhx2nY9JI3feYpw_HFNANv0YD2a3nE5hBACcdWp25CoNwN-c-DF78L8zpKXHL9fPJAvbdKhU7VO4s2l22uzNixvwhmM1_-C0M_66LbkJDpLfjuTtz2Xvr7juJgQ7atpQo3zPA6o1ZOXXQqYSOdvHAnTTYamV6TwF7s8vy0ulSkHXP8A"
    );
}
