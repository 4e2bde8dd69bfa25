//! Full issue / verify / derive / prove flow through the public API.

use idseal_core::error::ErrorKind;
use idseal_core::{
    create_proof, generate_challenge, identifier, verify_proof, HashAlgorithm, IdentityContext,
    IdentityData, Identifier, Key, DEFAULT_CHALLENGE_SIZE,
};

fn alice() -> IdentityData {
    IdentityData::new(["user"], ["alice"])
}

#[test]
fn issue_verify_derive_prove() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let mut id = Identifier::create(&mut ctx, &alice(), None).expect("create should succeed");
    assert_eq!(id.hash_size(), 32);
    assert_eq!(id.salt_size(), 32);
    assert_eq!(ctx.active_identifiers(), 1);

    let key = Key::create(&ctx, &id, None).expect("key should be created");
    assert!(id.verify(&ctx, Some(&key), &alice()).expect("verify should succeed"));
    assert!(!id
        .verify(&ctx, Some(&key), &IdentityData::new(["user"], ["bob"]))
        .expect("verify should succeed"));

    let mut auth = id.derive(&mut ctx, "auth", None).expect("derive should succeed");
    assert_ne!(auth.hash(), id.hash());
    assert_eq!(auth.hash_size(), id.hash_size());
    assert_eq!(auth.version(), id.version());
    assert_eq!(ctx.active_identifiers(), 2);

    let challenge = generate_challenge(&ctx, DEFAULT_CHALLENGE_SIZE).expect("challenge");
    let proof = create_proof(&ctx, &id, &challenge).expect("proof should be created");
    assert!(verify_proof(&ctx, &proof, &challenge, &id));
    let fresh = generate_challenge(&ctx, DEFAULT_CHALLENGE_SIZE).expect("challenge");
    assert!(!verify_proof(&ctx, &proof, &fresh, &id));
    assert!(!verify_proof(&ctx, &proof, &challenge, &auth));

    identifier::free(&mut ctx, Some(&mut auth));
    identifier::free(&mut ctx, Some(&mut id));
    assert_eq!(ctx.active_identifiers(), 0);
    assert_eq!(ctx.memory_used(), 0);
}

#[test]
fn field_order_does_not_matter() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let data = IdentityData::from_pairs([("email", "a@example.com"), ("user", "alice")]);
    let id = Identifier::create(&mut ctx, &data, None).expect("create should succeed");

    let reordered = IdentityData::from_pairs([("user", " alice "), ("email", "a@example.com")]);
    assert!(id.verify(&ctx, None, &reordered).expect("verify should succeed"));
}

#[test]
fn json_data_flows_through_identifier() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let data = IdentityData::from_json(r#"{"keys": ["user", "org"], "values": ["alice", "acme"]}"#)
        .expect("JSON data should parse");
    let id = Identifier::create(&mut ctx, &data, None).expect("create should succeed");
    assert!(id
        .verify(&ctx, None, &IdentityData::from_pairs([("org", "acme"), ("user", "alice")]))
        .expect("verify should succeed"));
}

#[test]
fn canonical_strings_survive_a_new_context() {
    let mut issuer = IdentityContext::create(None).expect("context should be created");
    let id = Identifier::create(&mut issuer, &alice(), None).expect("create should succeed");
    let key = Key::create(&issuer, &id, None).expect("key should be created");
    let id_text = id.encode(&issuer).expect("encode should succeed");
    let key_text = key.encode(&issuer).expect("encode should succeed");

    let mut verifier = IdentityContext::create(None).expect("context should be created");
    let id2 = Identifier::decode(&mut verifier, &id_text).expect("decode should succeed");
    let key2 = Key::decode(&verifier, &key_text).expect("decode should succeed");
    assert!(id2.verify(&verifier, Some(&key2), &alice()).expect("verify should succeed"));
    assert!(key2.verify(&verifier, &id2));
}

#[test]
fn every_hash_algorithm_supports_the_full_flow() {
    for algorithm in HashAlgorithm::ALL {
        let overrides = idseal_core::ConfigOverrides {
            algorithm: Some(algorithm.name().to_owned()),
            ..Default::default()
        };
        let mut ctx = IdentityContext::create(Some(&overrides)).expect("context should be created");
        let id = Identifier::create(&mut ctx, &alice(), None).expect("create should succeed");
        assert_eq!(id.hash_size(), algorithm.output_len(), "{algorithm}");

        let key = Key::create(&ctx, &id, None).expect("key should be created");
        assert!(id.verify(&ctx, Some(&key), &alice()).expect("verify should succeed"));

        let text = id.encode(&ctx).expect("encode should succeed");
        let parsed = Identifier::decode(&mut ctx, &text).expect("decode should succeed");
        assert_eq!(parsed, id, "{algorithm}");
    }
}

#[test]
fn mismatched_algorithm_is_a_rejected_request() {
    let mut sha512 = IdentityContext::create(Some(&idseal_core::ConfigOverrides {
        algorithm: Some("sha512".into()),
        ..Default::default()
    }))
    .expect("context should be created");
    let id = Identifier::create(&mut sha512, &alice(), None).expect("create should succeed");

    let sha256 = IdentityContext::create(None).expect("context should be created");
    let err = id.verify(&sha256, None, &alice()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailed);
}

#[test]
fn malformed_canonical_strings_are_rejected() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let id = Identifier::create(&mut ctx, &alice(), None).expect("create should succeed");
    let text = id.encode(&ctx).expect("encode should succeed");
    let fields: Vec<&str> = text.split(':').collect();

    let cases = [
        String::new(),
        format!("{}:{}", fields[0], fields[1]),
        format!("0:{}:{}", fields[1], fields[2]),
        format!("-1:{}:{}", fields[1], fields[2]),
        format!("{}:not base64!:{}", fields[0], fields[2]),
        format!("{}:{}:zz", fields[0], fields[1]),
        format!("{}:{}:{}", fields[0], fields[1], "00".repeat(32)),
        format!("{text}:extra"),
    ];
    for case in &cases {
        let err = Identifier::decode(&mut ctx, case).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat, "{case:?}");
    }
    assert_eq!(ctx.active_identifiers(), 1);
}
