use sealbox::{Error, LockedRegion};
use serial_test::serial;
use std::time::Duration;

fn defaults() {
    sealbox::set_zero_plaintext(false);
    sealbox::set_integrity_check(true);
}

#[test]
#[serial]
fn test_allocate_zero_free_cycle() {
    let mut region = sealbox::allocate_locked(16).expect("allocate failed");
    assert_eq!(region.len(), 16);

    sealbox::zero_locked(&mut region);
    sealbox::free_locked(&mut region).expect("free failed");

    // A second free of the cleared handle is a no-op success.
    sealbox::free_locked(&mut region).expect("repeat free should succeed");
    assert_eq!(region.len(), 0);
}

#[test]
#[serial]
fn test_round_trip() {
    defaults();
    let plaintext = b"hello world";
    let mut data = *plaintext;

    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();
    let mut recovered = buffer.decrypt().unwrap();

    assert_eq!(recovered.as_slice(), plaintext);

    sealbox::free_locked(&mut recovered).unwrap();
    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_round_trip_sizes() {
    defaults();
    for size in [0usize, 1, 13, 4096, 64 * 1024] {
        let original: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let mut data = original.clone();

        let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();
        let recovered = buffer.decrypt().unwrap();

        assert_eq!(recovered.len(), size, "size {} round trip length", size);
        assert_eq!(recovered.as_slice(), original.as_slice(), "size {} round trip", size);

        drop(recovered);
        buffer.destroy().unwrap();
    }
}

#[test]
#[serial]
fn test_with_plaintext_runs_exactly_once() {
    defaults();
    let plaintext = b"hello world";
    let mut data = *plaintext;
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    let mut calls = 0;
    let length = buffer
        .with_plaintext(|pt| {
            calls += 1;
            assert_eq!(pt, plaintext);
            Ok(pt.len())
        })
        .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(length, plaintext.len());

    // Errors from the closure propagate.
    let err = buffer
        .with_plaintext::<_, ()>(|_| Err(Error::InvalidInput))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput));

    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_encrypt_wipes_input_with_flag_set() {
    defaults();
    sealbox::set_zero_plaintext(true);

    let mut data = *b"password";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    assert_eq!(data, [0u8; 8], "plaintext slice not wiped");
    buffer.destroy().unwrap();

    sealbox::set_zero_plaintext(false);
}

#[test]
#[serial]
fn test_encrypt_wipes_input_without_flag() {
    defaults();

    let mut data = *b"wipe-me";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    // The byte-slice path wipes its input unconditionally.
    assert_eq!(data, [0u8; 7], "plaintext slice not wiped");
    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_encrypt_locked_preserves_source_by_default() {
    defaults();

    let mut source = sealbox::allocate_locked(5).unwrap();
    source.as_mut_slice().copy_from_slice(b"abcde");

    let buffer = sealbox::encrypt_locked(&mut source).unwrap();

    assert_eq!(source.as_slice(), b"abcde");

    buffer
        .with_plaintext(|pt| {
            assert_eq!(pt, b"abcde");
            Ok(())
        })
        .unwrap();

    sealbox::free_locked(&mut source).unwrap();
    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_encrypt_locked_wipes_source_when_configured() {
    defaults();
    sealbox::set_zero_plaintext(true);

    let mut source = sealbox::allocate_locked(5).unwrap();
    source.as_mut_slice().copy_from_slice(b"abcde");

    let buffer = sealbox::encrypt_locked(&mut source).unwrap();

    assert_eq!(source.as_slice(), &[0u8; 5]);

    sealbox::free_locked(&mut source).unwrap();
    buffer.destroy().unwrap();

    sealbox::set_zero_plaintext(false);
}

#[test]
#[serial]
fn test_encrypt_locked_rejects_released_region() {
    defaults();

    let mut source = sealbox::allocate_locked(4).unwrap();
    sealbox::free_locked(&mut source).unwrap();

    assert!(matches!(
        sealbox::encrypt_locked(&mut source),
        Err(Error::InvalidInput)
    ));
}

#[test]
#[serial]
fn test_destroy_is_idempotent() {
    defaults();
    let mut data = *b"secret";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    buffer.destroy().unwrap();
    buffer.destroy().unwrap();
    assert!(buffer.is_destroyed());
    assert_eq!(buffer.len(), 0);
}

#[test]
#[serial]
fn test_operations_after_destroy_fail() {
    defaults();
    let mut data = *b"secret";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();
    buffer.destroy().unwrap();

    assert!(matches!(buffer.decrypt(), Err(Error::UseAfterDestroy)));
    assert!(matches!(
        buffer.with_plaintext(|_| Ok(())),
        Err(Error::UseAfterDestroy)
    ));

    // Arming a timer on a destroyed buffer is a no-op.
    buffer.destroy_after(Duration::from_millis(10));
    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_destroy_after_fires() {
    defaults();
    let mut data = *b"ephemeral";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    buffer.destroy_after(Duration::from_millis(50));
    std::thread::sleep(Duration::from_millis(400));

    assert!(buffer.is_destroyed());
    assert!(matches!(buffer.decrypt(), Err(Error::UseAfterDestroy)));
}

#[test]
#[serial]
fn test_destroy_after_rearm_cancels_previous_timer() {
    defaults();
    let mut data = *b"ephemeral";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    buffer.destroy_after(Duration::from_millis(50));
    buffer.destroy_after(Duration::from_secs(60));
    std::thread::sleep(Duration::from_millis(400));

    assert!(
        !buffer.is_destroyed(),
        "re-arm should have cancelled the short timer"
    );

    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_explicit_destroy_beats_armed_timer() {
    defaults();
    let mut data = *b"ephemeral";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    buffer.destroy_after(Duration::from_millis(100));
    buffer.destroy().unwrap();
    assert!(buffer.is_destroyed());

    // The stale timer firing later must stay a no-op.
    std::thread::sleep(Duration::from_millis(300));
    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_timer_survives_dropped_buffer() {
    defaults();
    let mut data = *b"ephemeral";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    buffer.destroy_after(Duration::from_millis(50));
    drop(buffer);

    // The timer thread wakes after the envelope is gone; it must find the
    // weak reference dangling and exit quietly.
    std::thread::sleep(Duration::from_millis(300));
}

#[test]
#[serial]
fn test_decrypt_result_is_owned_locked_region() {
    defaults();
    let mut data = *b"owned";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();

    let mut first: LockedRegion = buffer.decrypt().unwrap();
    let mut second: LockedRegion = buffer.decrypt().unwrap();
    assert_eq!(first.as_slice(), second.as_slice());

    sealbox::free_locked(&mut first).unwrap();
    // The second copy is independent of the first.
    assert_eq!(second.as_slice(), b"owned");
    sealbox::free_locked(&mut second).unwrap();

    buffer.destroy().unwrap();
}

#[test]
#[serial]
fn test_integrity_check_disabled_round_trip() {
    defaults();
    sealbox::set_integrity_check(false);

    let mut data = *b"no trailer";
    let buffer = sealbox::encrypt_to_memory(&mut data).unwrap();
    buffer
        .with_plaintext(|pt| {
            assert_eq!(pt, b"no trailer");
            Ok(())
        })
        .unwrap();
    buffer.destroy().unwrap();

    sealbox::set_integrity_check(true);
}
