// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise card/reader authentication and secure messaging end to end.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use desfire_crypto::{
    AuthMode, CardChallenge, CryptoError, DesfireKey, KeyFamily, KeyType, ReaderHandshake,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

fn run_handshake(key: &DesfireKey, mode: AuthMode, rng: &mut StdRng) {
    let family = key.family();
    let rnd_b = random_bytes(rng, family.challenge_len());
    let rnd_a = random_bytes(rng, family.challenge_len());

    let (challenge, cryptogram) =
        CardChallenge::issue(key, mode, rnd_b).expect("card issues challenge");
    let mut reader = ReaderHandshake::new(key, mode).expect("reader accepts key");
    let token = reader.respond(&cryptogram, &rnd_a).expect("reader token");
    assert_eq!(token.len(), challenge.token_len());

    let proof = challenge.verify(&token).expect("card verifies reader");
    let reader_session = reader.finish(&proof.response).expect("reader verifies card");
    assert_eq!(reader_session, proof.session);
    assert_eq!(reader_session.checksum(), mode.checksum());

    let len = rng.gen_range(0..80);
    let payload = random_bytes(rng, len);
    let sealed = proof.session.encrypt(&payload).expect("card seals");
    assert_eq!(
        reader_session.decrypt(&sealed).expect("reader opens"),
        payload
    );
}

#[test]
fn every_family_authenticates_and_exchanges_data() {
    let mut rng = StdRng::seed_from_u64(0xA17E_0001);
    let cases = [
        (KeyType::TripleDes, vec![0u8; 16], AuthMode::Legacy, KeyFamily::Des),
        (KeyType::TripleDes, (0u8..16).collect(), AuthMode::Legacy, KeyFamily::Tdes),
        (KeyType::TripleDes, (0u8..16).collect(), AuthMode::Iso, KeyFamily::Tdes),
        (KeyType::ThreeKeyTripleDes, (0u8..24).collect(), AuthMode::Iso, KeyFamily::Tk3des),
        (KeyType::ThreeKeyTripleDes, (0u8..24).collect(), AuthMode::Legacy, KeyFamily::Tk3des),
        (KeyType::Aes, (0x40u8..0x50).collect(), AuthMode::Aes, KeyFamily::Aes),
    ];
    for (key_type, material, mode, family) in cases {
        let key = DesfireKey::new(key_type, &material, 0).expect("key");
        assert_eq!(key.family(), family);
        for _ in 0..8 {
            run_handshake(&key, mode, &mut rng);
        }
    }
}

#[test]
fn wrong_reader_key_is_rejected_by_card() {
    let mut rng = StdRng::seed_from_u64(7);
    let card_key = DesfireKey::new(KeyType::Aes, &[0x11; 16], 0).expect("card key");
    let reader_key = DesfireKey::new(KeyType::Aes, &[0x22; 16], 0).expect("reader key");

    let (challenge, cryptogram) =
        CardChallenge::issue(&card_key, AuthMode::Aes, random_bytes(&mut rng, 16))
            .expect("challenge");
    let mut reader = ReaderHandshake::new(&reader_key, AuthMode::Aes).expect("reader");
    let token = reader
        .respond(&cryptogram, &random_bytes(&mut rng, 16))
        .expect("token");
    assert_eq!(
        challenge.verify(&token),
        Err(CryptoError::AuthenticationMismatch)
    );
}

#[test]
fn forged_card_proof_is_rejected_by_reader() {
    let mut rng = StdRng::seed_from_u64(9);
    let key = DesfireKey::zero(KeyType::TripleDes);
    let (challenge, cryptogram) =
        CardChallenge::issue(&key, AuthMode::Legacy, random_bytes(&mut rng, 8)).expect("issue");
    let mut reader = ReaderHandshake::new(&key, AuthMode::Legacy).expect("reader");
    let token = reader
        .respond(&cryptogram, &random_bytes(&mut rng, 8))
        .expect("token");
    let mut proof = challenge.verify(&token).expect("card proof").response;
    proof[3] ^= 0x01;
    assert_eq!(
        reader.finish(&proof),
        Err(CryptoError::AuthenticationMismatch)
    );
}

#[test]
fn modes_reject_foreign_key_types() {
    let aes = DesfireKey::zero(KeyType::Aes);
    let des = DesfireKey::zero(KeyType::TripleDes);
    assert!(matches!(
        CardChallenge::issue(&aes, AuthMode::Iso, vec![0; 16]),
        Err(CryptoError::ModeMismatch { .. })
    ));
    assert!(matches!(
        ReaderHandshake::new(&des, AuthMode::Aes),
        Err(CryptoError::ModeMismatch { .. })
    ));
    assert!(matches!(
        CardChallenge::issue(&des, AuthMode::Legacy, vec![0; 16]),
        Err(CryptoError::ChallengeLength {
            expected: 8,
            actual: 16
        })
    ));
}
