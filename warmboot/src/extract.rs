use log::{debug, info, warn};

use crate::firmware::{self, FirmwareVersion};
use crate::fuse::{self, HardwareFamily};
use crate::fusedb::FuseDatabase;
use crate::layout::Layout;
use crate::package1::{ContainerImage, Package1Header};
use crate::path::warmboot_path;
use crate::pk11::{self, Navigator, Pk11Header, MAX_SIGNATURE_READS};
use crate::platform::{BlockStorage, BufferAllocator, CipherEngine, FuseRegisters, HeapAllocator, StorageSession};
use crate::string::SizedCString;
use crate::warmboot::{Warmboot, WARMBOOT_SIZE_RANGE};
use crate::{Result, WarmbootError};

/// Where the warmboot sat relative to the PK11 header. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVariant {
    /// PK11 header advertises the warmboot size itself
    Inline,
    Traditional,
}

impl LayoutVariant {
    #[must_use]
    pub fn detect(header: &Pk11Header, warmboot_size: u32) -> Self {
        let advertised = header.warmboot_size();
        if advertised == warmboot_size && WARMBOOT_SIZE_RANGE.contains(&advertised) {
            Self::Inline
        } else {
            Self::Traditional
        }
    }
}

/// Whatever was learned during an extraction, kept even when it fails
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub family: Option<HardwareFamily>,
    pub burnt_fuses: u8,
    pub package1_version: u8,
    pub package1_date: SizedCString<8>,
    pub target_firmware: FirmwareVersion,
    /// PK11 offsets checked, in order
    pub pk11_candidates: Vec<usize>,
    pub pk11_offset: Option<usize>,
    pub pk11_header: [u32; 8],
    pub signatures: [u32; MAX_SIGNATURE_READS],
    pub signature_reads: usize,
    /// Final navigator position, relative to the PK11 header
    pub cursor_offset: Option<usize>,
    pub layout_variant: Option<LayoutVariant>,
    /// Size word found at the cursor, valid or not
    pub warmboot_size: Option<u32>,
    pub warmboot_preview: [u8; 16],
}

/// How the unit's burnt fuses relate to what its firmware expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseComparison {
    Match,
    /// Downgraded unit; the loader's own cache would be named after `expected`
    BurntAhead { burnt: u32, expected: u32 },
    /// Fewer fuses than the firmware wants, should not happen on a booting unit
    BurntBehind { burnt: u32, expected: u32 },
}

#[derive(Debug)]
pub struct Extraction {
    pub warmboot: Warmboot,
    pub target_firmware: FirmwareVersion,
    pub burnt_fuses: u8,
    pub family: HardwareFamily,
    pub diagnostics: Diagnostics,
}

impl Extraction {
    /// Loader path the blob belongs at
    #[must_use]
    pub fn path(&self) -> String {
        warmboot_path(self.family, self.burnt_fuses)
    }
    #[must_use]
    pub fn expected_fuses(&self, db: &FuseDatabase) -> u32 {
        db.expected_fuse_count(self.target_firmware)
    }
    #[must_use]
    pub fn fuse_comparison(&self, db: &FuseDatabase) -> FuseComparison {
        let burnt = u32::from(self.burnt_fuses);
        let expected = self.expected_fuses(db);
        match burnt.cmp(&expected) {
            std::cmp::Ordering::Equal => FuseComparison::Match,
            std::cmp::Ordering::Greater => FuseComparison::BurntAhead { burnt, expected },
            std::cmp::Ordering::Less => FuseComparison::BurntBehind { burnt, expected },
        }
    }
    #[cfg(feature = "hash")]
    #[must_use]
    pub fn digest(&self) -> crate::hash::ImageDigest {
        crate::hash::ImageDigest::of(self.warmboot.as_bytes())
    }
}

/// Pulls the warmboot firmware out of Package1
pub struct Extractor<S, C, F, A = HeapAllocator> {
    storage: S,
    cipher: C,
    fuses: F,
    allocator: A,
    layout: Layout,
}

impl<S, C, F> Extractor<S, C, F>
where
    S: BlockStorage,
    C: CipherEngine,
    F: FuseRegisters,
{
    pub fn new(storage: S, cipher: C, fuses: F) -> Self {
        Self {
            storage,
            cipher,
            fuses,
            allocator: HeapAllocator,
            layout: Layout::default(),
        }
    }
}

impl<S, C, F, A> Extractor<S, C, F, A>
where
    S: BlockStorage,
    C: CipherEngine,
    F: FuseRegisters,
    A: BufferAllocator,
{
    pub fn with_allocator<B: BufferAllocator>(self, allocator: B) -> Extractor<S, C, F, B> {
        Extractor {
            storage: self.storage,
            cipher: self.cipher,
            fuses: self.fuses,
            allocator,
            layout: self.layout,
        }
    }
    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
    pub fn layout(&self) -> &Layout {
        &self.layout
    }
    pub fn family(&self) -> HardwareFamily {
        HardwareFamily::detect(&self.fuses)
    }
    pub fn burnt_fuses(&self) -> u8 {
        fuse::burnt_fuses(&self.fuses)
    }
    pub fn into_parts(self) -> (S, C, F, A) {
        (self.storage, self.cipher, self.fuses, self.allocator)
    }

    fn read_package1(storage: &mut S, layout: &Layout, buf: &mut [u8]) -> Result<()> {
        let mut session = StorageSession::begin(storage).map_err(WarmbootError::StorageInitFailure)?;
        session
            .set_partition(layout.partition)
            .map_err(WarmbootError::StoragePartitionSelectFailure)?;
        session
            .read_blocks(layout.start_block(), layout.block_count(), buf)
            .map_err(WarmbootError::StorageReadFailure)?;
        Ok(())
    }

    /// Runs one extraction
    ///
    /// `diag` is reset and then filled in as far as the extraction got, so it is worth
    /// displaying after a failure too. The container buffer is always handed back to the
    /// allocator before this returns; only the warmboot buffer of a successful run outlives it.
    pub fn extract(&mut self, diag: &mut Diagnostics) -> Result<Extraction> {
        *diag = Diagnostics::default();
        let layout = self.layout.clone();
        if layout.block_size == 0 || layout.block_count() == 0 {
            return Err(WarmbootError::NullArgument);
        }

        let family = HardwareFamily::detect(&self.fuses);
        let burnt_fuses = fuse::burnt_fuses(&self.fuses);
        diag.family = Some(family);
        diag.burnt_fuses = burnt_fuses;
        info!("{family} with {burnt_fuses} burnt fuses");
        if !family.is_mariko() {
            return Err(WarmbootError::UnsupportedHardwareFamily);
        }

        let mut container = ContainerImage::allocate(&self.allocator, layout.read_size(), layout.header_size)?;
        Self::read_package1(&mut self.storage, &layout, container.raw_mut())?;
        container.decrypt(&layout, &mut self.cipher)?;
        let view = container
            .decrypted()
            .ok_or(WarmbootError::DecryptVerificationFailure)?;

        let header = Package1Header::from_bytes(view)?;
        let target_firmware = firmware::identify(header.version(), header.build_date().data());
        diag.package1_version = header.version();
        diag.package1_date = header.build_date().clone();
        diag.target_firmware = target_firmware;
        if target_firmware.is_known() {
            info!("Package1 {} is firmware {target_firmware}", header.build_date());
        } else {
            warn!(
                "Unknown Package1 (version {:#04x}, date {}), naming by fuses only",
                header.version(),
                header.build_date()
            );
        }

        let order = layout.pk11_search_order(target_firmware.raw());
        let found = pk11::locate(view, &order);
        diag.pk11_candidates = match found {
            Some(offset) if offset == order[0] => vec![offset],
            _ => order.to_vec(),
        };
        let pk11_offset = found.ok_or(WarmbootError::ContainerMagicNotFound)?;
        diag.pk11_offset = Some(pk11_offset);

        let mut nav = Navigator::new(view, pk11_offset)?;
        diag.pk11_header = nav.header().words();
        let walked = nav.run();
        diag.signatures = nav.signatures();
        diag.signature_reads = nav.reads();
        diag.cursor_offset = Some(nav.relative_cursor());
        let cursor = walked?;

        let size = pk11::read_u32(view, cursor)?;
        diag.warmboot_size = Some(size);
        diag.layout_variant = Some(LayoutVariant::detect(nav.header(), size));
        debug!("Warmboot candidate at {cursor:#x}, size word {size:#x}");

        let warmboot = Warmboot::package(view, cursor, &self.allocator)?;
        diag.warmboot_preview = warmboot.preview();
        info!("Extracted {:#x} byte warmboot", warmboot.size());

        Ok(Extraction {
            warmboot,
            target_firmware,
            burnt_fuses,
            family,
            diagnostics: diag.clone(),
        })
    }
}
