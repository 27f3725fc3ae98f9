use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;

use crate::shamir3pass::{
    decode_biguint_b64u, encode_biguint_b64u, key_id_for_exponent, Shamir3Pass, Shamir3PassError,
};

#[test]
fn lock_keys_are_mutual_inverses() {
    let shamir = Shamir3Pass::new_default();
    for _ in 0..8 {
        let keys = shamir.generate_lock_keys().unwrap();
        let product = (&keys.e * &keys.d) % shamir.p_minus_1();
        assert_eq!(product, BigUint::one());
        assert_eq!(keys.e.gcd(shamir.p_minus_1()), BigUint::one());
    }
}

#[test]
fn locks_commute_and_cancel() {
    let shamir = Shamir3Pass::new_default();
    let client = shamir.generate_lock_keys().unwrap();
    let server = shamir.generate_lock_keys().unwrap();
    let kek = shamir.random_kek().unwrap();

    // Client lock, then server lock, then both removed in either order:
    // the original value comes back.
    let kek_c = shamir.add_lock(&kek, &client.e).unwrap();
    let kek_cs = shamir.add_lock(&kek_c, &server.e).unwrap();
    let kek_s = shamir.remove_lock(&kek_cs, &client.d).unwrap();
    let recovered = shamir.remove_lock(&kek_s, &server.d).unwrap();
    assert_eq!(recovered, kek);

    // Opposite interleaving.
    let kek_sc = shamir.add_lock(&shamir.add_lock(&kek, &server.e).unwrap(), &client.e).unwrap();
    assert_eq!(kek_sc, kek_cs);
}

#[test]
fn modinv_matches_definition() {
    let shamir = Shamir3Pass::new_default();
    for value in 2u32..24 {
        let a = BigUint::from(value);
        if a.gcd(shamir.p_minus_1()) != BigUint::one() {
            assert!(shamir.modinv(&a).is_none());
            continue;
        }
        let inv = shamir.modinv(&a).unwrap();
        assert_eq!((&a * &inv) % shamir.p_minus_1(), BigUint::one());
    }
}

#[test]
fn add_lock_rejects_out_of_range_values() {
    let shamir = Shamir3Pass::new_default();
    let keys = shamir.generate_lock_keys().unwrap();
    assert!(matches!(
        shamir.add_lock(&BigUint::from(0u32), &keys.e),
        Err(Shamir3PassError::ValueOutOfRange)
    ));
    assert!(matches!(
        shamir.add_lock(shamir.p(), &keys.e),
        Err(Shamir3PassError::ValueOutOfRange)
    ));
}

#[test]
fn kek_aead_bridge_round_trip() {
    let shamir = Shamir3Pass::new_default();
    let kek = shamir.random_kek().unwrap();
    let plaintext = b"vrf keypair bytes";

    let ciphertext = shamir.encrypt_with_kek(&kek, plaintext).unwrap();
    assert_ne!(&ciphertext[12..], &plaintext[..]);
    let decrypted = shamir.decrypt_with_kek(&kek, &ciphertext).unwrap();
    assert_eq!(decrypted, plaintext);

    let wrong_kek = shamir.random_kek().unwrap();
    assert!(shamir.decrypt_with_kek(&wrong_kek, &ciphertext).is_err());
}

#[test]
fn rejects_small_primes() {
    let small = encode_biguint_b64u(&BigUint::from(65_537u32));
    assert!(matches!(
        Shamir3Pass::new(&small),
        Err(Shamir3PassError::PrimeTooSmall { .. })
    ));
}

#[test]
fn biguint_b64u_round_trip() {
    let value = BigUint::from(123_456_789_012_345_678u64);
    let encoded = encode_biguint_b64u(&value);
    assert_eq!(decode_biguint_b64u(&encoded).unwrap(), value);
}

#[test]
fn key_id_is_stable_and_exponent_specific() {
    let shamir = Shamir3Pass::new_default();
    let keys = shamir.generate_lock_keys().unwrap();
    assert_eq!(key_id_for_exponent(&keys.e), key_id_for_exponent(&keys.e));
    assert_ne!(key_id_for_exponent(&keys.e), key_id_for_exponent(&keys.d));
}
