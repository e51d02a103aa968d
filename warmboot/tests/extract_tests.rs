//! End to end extraction against synthetic BOOT0 images

mod common;

use common::*;
use warmboot::firmware::FirmwareVersion;
use warmboot::pk11::{SIG_NX_BOOTLOADER, SIG_SECURE_MONITOR_1, SIG_SECURE_MONITOR_2};
use warmboot::platform::Partition;
use warmboot::prelude::*;
use warmboot::warmboot::WBT0_MAGIC;
use warmboot::Result;

struct Run {
    result: Result<Extraction>,
    diag: Diagnostics,
    storage: MockStorage,
    cipher: IdentityCipher,
}

fn run_with(mut storage: MockStorage, fuses: StaticFuses, layout: Layout) -> Run {
    let mut cipher = IdentityCipher::default();
    let mut diag = Diagnostics::default();
    let result = Extractor::new(&mut storage, &mut cipher, &fuses)
        .with_layout(layout)
        .extract(&mut diag);
    Run { result, diag, storage, cipher }
}

fn run(builder: &Package1Builder) -> Run {
    run_with(
        MockStorage::with_boot0(builder.plain_boot0()),
        mariko_fuses(22),
        Layout::default(),
    )
}

// ============================================================================
// Successful extractions
// ============================================================================

#[test]
fn test_standard_container() {
    let Run { result, diag, storage, cipher } = run(&Package1Builder::standard(0x900));
    let extraction = result.unwrap();

    assert_eq!(extraction.warmboot.size(), 0x900);
    assert_eq!(extraction.warmboot.as_bytes(), expected_blob(0x900).as_slice());
    assert_eq!(extraction.target_firmware, FirmwareVersion::new(0xD00));
    assert_eq!(extraction.burnt_fuses, 22);
    assert_eq!(extraction.family, HardwareFamily::Mariko);
    assert_eq!(extraction.path(), "sd:/warmboot_mariko/wb_16.bin");

    assert_eq!(diag.pk11_candidates, vec![0x7000]);
    assert_eq!(diag.pk11_offset, Some(0x7000));
    assert_eq!(diag.signature_reads, 2);
    assert_eq!(diag.signatures, [SIG_NX_BOOTLOADER, 0x900, 0]);
    assert_eq!(diag.cursor_offset, Some(0x120));
    assert_eq!(diag.warmboot_size, Some(0x900));
    assert_eq!(diag.layout_variant, Some(LayoutVariant::Traditional));
    assert_eq!(diag.warmboot_preview[..4], 0x900u32.to_le_bytes());
    assert_eq!(diag.package1_date.as_str(), Ok("20210805"));
    assert_eq!(extraction.diagnostics, diag);

    assert_eq!(storage.partition, Some(Partition::Boot0));
    assert_eq!(storage.init_calls, 1);
    assert_eq!(storage.end_calls, 1);
    assert_eq!(cipher.last_slot, Some(13));
    assert_eq!(cipher.calls, 1);
}

#[test]
fn test_encrypted_container() {
    let builder = Package1Builder::standard(0xA40);
    let keys = KeyBag::from_string(&format!("mariko_bek = {}\n", hex::encode(TEST_BEK))).unwrap();
    let mut cipher = SoftwareCipher::from_keybag(&keys).unwrap();
    let mut storage = MockStorage::with_boot0(builder.encrypted_boot0(&TEST_BEK));
    let fuses = mariko_fuses(20);
    let mut diag = Diagnostics::default();

    let extraction = Extractor::new(&mut storage, &mut cipher, &fuses)
        .extract(&mut diag)
        .unwrap();

    assert_eq!(extraction.warmboot.as_bytes(), expected_blob(0xA40).as_slice());
    assert_eq!(extraction.path(), "sd:/warmboot_mariko/wb_14.bin");
    assert_eq!(extraction.target_firmware.to_string(), "13.0.0");
}

#[test]
fn test_wrong_key_fails_verification() {
    let builder = Package1Builder::standard(0x900);
    let mut cipher = SoftwareCipher::new();
    cipher.set_key(13, TEST_BEK);
    let mut storage = MockStorage::with_boot0(builder.encrypted_boot0(&WRONG_BEK));
    let fuses = mariko_fuses(22);
    let mut diag = Diagnostics::default();

    let err = Extractor::new(&mut storage, &mut cipher, &fuses)
        .extract(&mut diag)
        .unwrap_err();

    assert!(matches!(err, WarmbootError::DecryptVerificationFailure));
    assert_eq!(err.code(), 7);
    assert_eq!(diag.family, Some(HardwareFamily::Mariko));
    assert_eq!(diag.target_firmware, FirmwareVersion::UNKNOWN);
    assert_eq!(diag.pk11_offset, None);
    assert_eq!(storage.end_calls, 1);
}

#[test]
fn test_old_firmware_finds_pk11_at_first_offset() {
    let builder = Package1Builder::new()
        .firmware(VERSION_5_0_0, b"20180220")
        .pk11_at(Some(0x4000))
        .header_word(6, 0x100)
        .word_at(0, SIG_NX_BOOTLOADER)
        .warmboot_at(0x100, 0x900);
    let Run { result, diag, .. } = run(&builder);

    assert_eq!(result.unwrap().target_firmware, FirmwareVersion::new(0x500));
    assert_eq!(diag.pk11_candidates, vec![0x4000]);
    assert_eq!(diag.pk11_offset, Some(0x4000));
}

#[test]
fn test_pk11_falls_back_to_other_offset() {
    // 13.0.0 hints 0x7000 first
    let builder = Package1Builder::new()
        .pk11_at(Some(0x4000))
        .header_word(6, 0x100)
        .word_at(0, SIG_NX_BOOTLOADER)
        .warmboot_at(0x100, 0x900);
    let Run { result, diag, .. } = run(&builder);

    assert!(result.is_ok());
    assert_eq!(diag.pk11_candidates, vec![0x7000, 0x4000]);
    assert_eq!(diag.pk11_offset, Some(0x4000));
}

#[test]
fn test_unknown_firmware_still_extracts() {
    let builder = Package1Builder::standard(0x900).firmware(0x10, b"20991231");
    let Run { result, diag, .. } = run(&builder);
    let extraction = result.unwrap();

    assert!(!extraction.target_firmware.is_known());
    assert_eq!(diag.target_firmware, FirmwareVersion::UNKNOWN);
    assert_eq!(diag.package1_version, 0x10);
    // without a hint the old offset is tried first
    assert_eq!(diag.pk11_candidates, vec![0x4000, 0x7000]);
    assert_eq!(extraction.path(), "sd:/warmboot_mariko/wb_16.bin");
}

#[test]
fn test_three_sub_images_are_skipped() {
    let builder = Package1Builder::new()
        .header_word(6, 0x43)
        .header_word(4, 0x80)
        .word_at(0, SIG_NX_BOOTLOADER)
        .word_at(0x40, SIG_SECURE_MONITOR_1)
        .word_at(0xC0, SIG_SECURE_MONITOR_2)
        .warmboot_at(0x140, 0x800);
    let Run { result, diag, .. } = run(&builder);

    assert_eq!(result.unwrap().warmboot.size(), 0x800);
    assert_eq!(diag.signature_reads, 3);
    assert_eq!(
        diag.signatures,
        [SIG_NX_BOOTLOADER, SIG_SECURE_MONITOR_1, SIG_SECURE_MONITOR_2]
    );
    assert_eq!(diag.cursor_offset, Some(0x20 + 0x140));
}

#[test]
fn test_warmboot_first_needs_one_read() {
    let builder = Package1Builder::new().warmboot_at(0, 0xC00);
    let Run { result, diag, .. } = run(&builder);

    assert_eq!(result.unwrap().warmboot.size(), 0xC00);
    assert_eq!(diag.signature_reads, 1);
    assert_eq!(diag.signatures, [0xC00, 0, 0]);
    assert_eq!(diag.cursor_offset, Some(0x20));
}

#[test]
fn test_inline_layout_detected() {
    let builder = Package1Builder::standard(0x900).header_word(1, 0x900);
    let Run { result, diag, .. } = run(&builder);

    assert!(result.is_ok());
    assert_eq!(diag.pk11_header[1], 0x900);
    assert_eq!(diag.layout_variant, Some(LayoutVariant::Inline));
}

#[test]
fn test_wbt0_metadata() {
    let builder = Package1Builder::standard(0x900)
        .word_at(0x104, WBT0_MAGIC)
        .word_at(0x108, 0x1300);
    let extraction = run(&builder).result.unwrap();

    let meta = extraction.warmboot.metadata().unwrap();
    assert_eq!(meta.target_firmware, 0x1300);
    assert_eq!(extraction.warmboot.image().len(), 0x900 - 4);
}

#[test]
fn test_fuse_comparison_against_builtin_table() {
    let db = FuseDatabase::new();
    let extraction = run(&Package1Builder::standard(0x900)).result.unwrap();
    assert_eq!(extraction.expected_fuses(&db), 15);
    assert_eq!(
        extraction.fuse_comparison(&db),
        FuseComparison::BurntAhead { burnt: 22, expected: 15 }
    );

    let matching = run_with(
        MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0()),
        mariko_fuses(15),
        Layout::default(),
    );
    let extraction = matching.result.unwrap();
    assert_eq!(extraction.fuse_comparison(&db), FuseComparison::Match);
    assert_eq!(extraction.path(), "sd:/warmboot_mariko/wb_0f.bin");
}

#[test]
fn test_custom_window() {
    let layout = Layout {
        package1_offset: 0x8000,
        package1_size: 0x1_0000,
        ..Layout::default()
    };
    let builder = Package1Builder::standard(0x900).layout(layout.clone());
    let run = run_with(MockStorage::with_boot0(builder.plain_boot0()), mariko_fuses(3), layout);

    assert_eq!(run.result.unwrap().warmboot.as_bytes(), expected_blob(0x900).as_slice());
}

#[cfg(feature = "hash")]
#[test]
fn test_digest_covers_size_prefix() {
    let extraction = run(&Package1Builder::standard(0x900)).result.unwrap();
    let digest = extraction.digest();
    assert_eq!(digest, warmboot::hash::ImageDigest::of(&expected_blob(0x900)));
    assert_eq!(digest.to_string().len(), 64);
}

// ============================================================================
// Warmboot size bounds
// ============================================================================

#[test]
fn test_size_bounds() {
    for (size, accepted) in [(0x800, true), (0xFFF, true), (0x7FF, false), (0x1000, false), (0x1001, false), (0, false)] {
        let Run { result, diag, .. } = run(&Package1Builder::standard(size));
        assert_eq!(diag.warmboot_size, Some(size), "size {size:#x}");
        match result {
            Ok(extraction) => {
                assert!(accepted, "size {size:#x} should be rejected");
                assert_eq!(extraction.warmboot.size(), size);
            },
            Err(err) => {
                assert!(!accepted, "size {size:#x} should be accepted");
                assert!(matches!(err, WarmbootError::ImageSizeOutOfRange { size: s } if s == size));
                assert_eq!(err.code(), 9);
            },
        }
    }
}

#[test]
fn test_truncated_container() {
    // view ends at 0x7290, the blob would run to 0x7a20
    let layout = Layout {
        package1_size: 0x7400,
        ..Layout::default()
    };
    let builder = Package1Builder::standard(0x900).layout(layout.clone());
    let run = run_with(MockStorage::with_boot0(builder.plain_boot0()), mariko_fuses(22), layout);

    let err = run.result.unwrap_err();
    assert!(matches!(err, WarmbootError::ContainerTruncated { .. }));
    assert_eq!(run.diag.warmboot_size, Some(0x900));
}

// ============================================================================
// Failures before the walk
// ============================================================================

#[test]
fn test_erista_is_rejected_before_storage() {
    let storage = MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0());
    let run = run_with(storage, erista_fuses(10), Layout::default());

    let err = run.result.unwrap_err();
    assert!(matches!(err, WarmbootError::UnsupportedHardwareFamily));
    assert_eq!(err.code(), 2);
    assert_eq!(run.diag.family, Some(HardwareFamily::Erista));
    assert_eq!(run.diag.burnt_fuses, 10);
    assert_eq!(run.storage.init_calls, 0);
    assert_eq!(run.cipher.calls, 0);
}

#[test]
fn test_empty_window() {
    let layout = Layout {
        package1_size: 0,
        ..Layout::default()
    };
    let run = run_with(MockStorage::default(), mariko_fuses(1), layout);

    assert!(matches!(run.result, Err(WarmbootError::NullArgument)));
    assert_eq!(run.diag, Diagnostics::default());
    assert_eq!(run.storage.init_calls, 0);
}

#[test]
fn test_storage_failures() {
    let image = Package1Builder::standard(0x900).plain_boot0();

    let mut storage = MockStorage::with_boot0(image.clone());
    storage.fail_init = true;
    let run = run_with(storage, mariko_fuses(22), Layout::default());
    assert!(matches!(run.result, Err(WarmbootError::StorageInitFailure(_))));
    assert_eq!(run.storage.end_calls, 0);

    let mut storage = MockStorage::with_boot0(image.clone());
    storage.fail_partition = true;
    let run = run_with(storage, mariko_fuses(22), Layout::default());
    assert!(matches!(run.result, Err(WarmbootError::StoragePartitionSelectFailure(_))));
    assert_eq!(run.storage.end_calls, 1);

    let mut storage = MockStorage::with_boot0(image);
    storage.fail_read = true;
    let run = run_with(storage, mariko_fuses(22), Layout::default());
    assert!(matches!(run.result, Err(WarmbootError::StorageReadFailure(_))));
    assert_eq!(run.storage.end_calls, 1);
    assert_eq!(run.cipher.calls, 0);
}

#[test]
fn test_stale_session_is_ended_first() {
    let mut storage = MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0());
    storage.stale = true;
    let run = run_with(storage, mariko_fuses(22), Layout::default());

    assert!(run.result.is_ok());
    assert_eq!(run.storage.init_calls, 1);
    assert_eq!(run.storage.end_calls, 2);
}

#[test]
fn test_cipher_fault() {
    let mut storage = MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0());
    let mut cipher = IdentityCipher {
        fault: true,
        ..IdentityCipher::default()
    };
    let fuses = mariko_fuses(22);
    let mut diag = Diagnostics::default();

    let err = Extractor::new(&mut storage, &mut cipher, &fuses)
        .extract(&mut diag)
        .unwrap_err();
    assert!(matches!(err, WarmbootError::CipherFault("engine busy")));
    assert_eq!(err.code(), 11);
}

#[test]
fn test_corrupted_decryption() {
    let mut storage = MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0());
    let mut cipher = IdentityCipher {
        corrupt: true,
        ..IdentityCipher::default()
    };
    let fuses = mariko_fuses(22);
    let mut diag = Diagnostics::default();

    let err = Extractor::new(&mut storage, &mut cipher, &fuses)
        .extract(&mut diag)
        .unwrap_err();
    assert!(matches!(err, WarmbootError::DecryptVerificationFailure));
}

#[test]
fn test_missing_magic() {
    let builder = Package1Builder::new().pk11_at(None).warmboot_at(0, 0x900);
    let Run { result, diag, .. } = run(&builder);

    let err = result.unwrap_err();
    assert!(matches!(err, WarmbootError::ContainerMagicNotFound));
    assert_eq!(err.code(), 8);
    assert_eq!(diag.pk11_candidates, vec![0x7000, 0x4000]);
    assert_eq!(diag.pk11_offset, None);
    assert_eq!(diag.target_firmware, FirmwareVersion::new(0xD00));
}

#[test]
fn test_diagnostics_are_reset_between_runs() {
    let mut diag = Diagnostics {
        warmboot_size: Some(0x1234),
        signature_reads: 3,
        ..Diagnostics::default()
    };
    let mut storage = MockStorage::with_boot0(Package1Builder::standard(0x900).plain_boot0());
    storage.fail_init = true;
    let mut cipher = IdentityCipher::default();
    let fuses = mariko_fuses(22);

    let result = Extractor::new(&mut storage, &mut cipher, &fuses).extract(&mut diag);
    assert!(result.is_err());
    assert_eq!(diag.warmboot_size, None);
    assert_eq!(diag.signature_reads, 0);
    assert_eq!(diag.burnt_fuses, 22);
}
