//! Typed address handles and the `CPDPBP` physical address tuple
//! (`spec.md` §3 "Address tuple `CPDPBP`" and "LPN/LSPN/PPN/PSPN/PBN/PSBN").

use std::fmt;

macro_rules! typed_handle {
    ($name:ident, $repr:ty, $invalid:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            pub const INVALID: $name = $name($invalid);

            pub fn is_valid(self) -> bool {
                self.0 != $invalid
            }

            /// Panics if `self` is the invalid sentinel — per spec.md §3,
            /// "arithmetic on an invalid value is a programmer error".
            pub fn require_valid(self) -> Self {
                assert!(self.is_valid(), concat!(stringify!($name), " is invalid"));
                self
            }

            pub fn get(self) -> $repr {
                self.require_valid().0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                } else {
                    write!(f, concat!(stringify!($name), "(invalid)"))
                }
            }
        }

        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                $name(v)
            }
        }
    };
}

typed_handle!(Lpn, u64, u64::MAX);
typed_handle!(Lspn, u64, u64::MAX);
typed_handle!(Ppn, u64, u64::MAX);
typed_handle!(Pspn, u64, u64::MAX);
typed_handle!(Pbn, u32, u32::MAX);
typed_handle!(Psbn, u32, u32::MAX);

/// The six-level physical address expansion of a PPN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cpdpbp {
    pub channel: u32,
    pub package: u32,
    pub die: u32,
    pub plane: u32,
    pub block: u32,
    pub page: u32,
}

/// The six dimensions of a `Cpdpbp`, used to describe a packing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Channel,
    Package,
    Die,
    Plane,
    Block,
    Page,
}

/// Sizes of each `CPDPBP` dimension plus the order PPN bits are packed in.
///
/// The default order is `[Channel, Package, Die, Plane, Block, Page]`
/// least-significant-first — the reverse of the logical hierarchy
/// (channel is the coarsest grouping, page the finest), which puts
/// `channel` in the PPN's low bits so adjacent PPNs stripe across
/// channels (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressConfig {
    pub channels: u32,
    pub packages: u32,
    pub dies: u32,
    pub planes: u32,
    pub blocks: u32,
    pub pages: u32,
    pub order: [Dim; 6],
}

impl AddressConfig {
    pub fn new(channels: u32, packages: u32, dies: u32, planes: u32, blocks: u32, pages: u32) -> Self {
        Self {
            channels,
            packages,
            dies,
            planes,
            blocks,
            pages,
            order: [Dim::Channel, Dim::Package, Dim::Die, Dim::Plane, Dim::Block, Dim::Page],
        }
    }

    fn size_of(&self, dim: Dim) -> u64 {
        match dim {
            Dim::Channel => self.channels as u64,
            Dim::Package => self.packages as u64,
            Dim::Die => self.dies as u64,
            Dim::Plane => self.planes as u64,
            Dim::Block => self.blocks as u64,
            Dim::Page => self.pages as u64,
        }
    }

    fn field_of(addr: &Cpdpbp, dim: Dim) -> u64 {
        (match dim {
            Dim::Channel => addr.channel,
            Dim::Package => addr.package,
            Dim::Die => addr.die,
            Dim::Plane => addr.plane,
            Dim::Block => addr.block,
            Dim::Page => addr.page,
        }) as u64
    }

    fn set_field(addr: &mut Cpdpbp, dim: Dim, value: u64) {
        let v = value as u32;
        match dim {
            Dim::Channel => addr.channel = v,
            Dim::Package => addr.package = v,
            Dim::Die => addr.die = v,
            Dim::Plane => addr.plane = v,
            Dim::Block => addr.block = v,
            Dim::Page => addr.page = v,
        }
    }

    /// Total number of distinct physical pages addressable by this
    /// geometry — the mixed-radix capacity of the packing.
    pub fn capacity(&self) -> u64 {
        self.order.iter().map(|d| self.size_of(*d)).product()
    }

    /// Bijective mixed-radix packing of `addr` into a `Ppn`, modulo the
    /// configured dimension sizes.
    pub fn assemble(&self, addr: &Cpdpbp) -> Ppn {
        let mut acc: u64 = 0;
        let mut multiplier: u64 = 1;
        for dim in self.order {
            let size = self.size_of(dim);
            let field = Self::field_of(addr, dim);
            assert!(field < size, "{:?} field {} out of range {}", dim, field, size);
            acc += field * multiplier;
            multiplier *= size;
        }
        Ppn(acc)
    }

    /// Inverse of [`Self::assemble`].
    pub fn disassemble(&self, ppn: Ppn) -> Cpdpbp {
        let mut rem = ppn.get();
        let mut addr = Cpdpbp::default();
        for dim in self.order {
            let size = self.size_of(dim);
            let field = rem % size;
            rem /= size;
            Self::set_field(&mut addr, dim, field);
        }
        addr
    }

    /// A flat index identifying the `(channel, package, die)` resource a
    /// PAL die-timeline belongs to.
    pub fn die_index(&self, addr: &Cpdpbp) -> u32 {
        addr.channel * self.packages * self.dies + addr.package * self.dies + addr.die
    }

    /// Number of distinct blocks (every `CPDPBP` dimension except `Page`).
    pub fn block_capacity(&self) -> u64 {
        self.order
            .iter()
            .filter(|d| **d != Dim::Page)
            .map(|d| self.size_of(*d))
            .product()
    }

    fn disassemble_block(&self, pbn: Pbn) -> Cpdpbp {
        let mut rem = pbn.get() as u64;
        let mut addr = Cpdpbp::default();
        for dim in self.order {
            if dim == Dim::Page {
                continue;
            }
            let size = self.size_of(dim);
            let field = rem % size;
            rem /= size;
            Self::set_field(&mut addr, dim, field);
        }
        addr
    }

    pub fn block_of(&self, ppn: Ppn) -> Pbn {
        let addr = self.disassemble(ppn);
        let mut acc: u64 = 0;
        let mut multiplier: u64 = 1;
        for dim in self.order {
            if dim == Dim::Page {
                continue;
            }
            let size = self.size_of(dim);
            acc += Self::field_of(&addr, dim) * multiplier;
            multiplier *= size;
        }
        Pbn(acc as u32)
    }

    pub fn page_offset_of(&self, ppn: Ppn) -> u32 {
        self.disassemble(ppn).page
    }

    pub fn ppn_for_block_page(&self, pbn: Pbn, page: u32) -> Ppn {
        let mut addr = self.disassemble_block(pbn);
        addr.page = page;
        self.assemble(&addr)
    }

    pub fn plane_of(&self, pbn: Pbn) -> u32 {
        self.disassemble_block(pbn).plane
    }

    /// `(channel, die)` index pair the PAL timeline keys its free-slot maps
    /// by, for the resource this block lives on.
    pub fn channel_die_of(&self, pbn: Pbn) -> (usize, usize) {
        let addr = self.disassemble_block(pbn);
        (addr.channel as usize, self.die_index(&addr) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg() -> AddressConfig {
        AddressConfig::new(4, 2, 2, 2, 64, 256)
    }

    #[test]
    fn round_trip_corners() {
        let cfg = cfg();
        for c in [0, cfg.channels - 1] {
            for pg in [0, cfg.pages - 1] {
                let addr = Cpdpbp {
                    channel: c,
                    package: 0,
                    die: 0,
                    plane: 0,
                    block: 0,
                    page: pg,
                };
                let ppn = cfg.assemble(&addr);
                assert_eq!(cfg.disassemble(ppn), addr);
            }
        }
    }

    #[test]
    fn adjacent_ppns_stripe_channels() {
        let cfg = cfg();
        let a = cfg.disassemble(Ppn(0));
        let b = cfg.disassemble(Ppn(1));
        assert_ne!(a.channel, b.channel);
    }

    proptest! {
        #[test]
        fn round_trip_any_valid_address(
            channel in 0u32..4, package in 0u32..2, die in 0u32..2,
            plane in 0u32..2, block in 0u32..64, page in 0u32..256,
        ) {
            let cfg = cfg();
            let addr = Cpdpbp { channel, package, die, plane, block, page };
            let ppn = cfg.assemble(&addr);
            prop_assert_eq!(cfg.disassemble(ppn), addr);
        }
    }

    #[test]
    #[should_panic]
    fn invalid_lpn_arithmetic_panics() {
        let _ = Lpn::INVALID.get();
    }

    #[test]
    fn block_and_page_offset_round_trip() {
        let cfg = cfg();
        let addr = Cpdpbp { channel: 2, package: 1, die: 0, plane: 1, block: 30, page: 200 };
        let ppn = cfg.assemble(&addr);
        let pbn = cfg.block_of(ppn);
        assert_eq!(cfg.page_offset_of(ppn), 200);
        assert_eq!(cfg.ppn_for_block_page(pbn, 200), ppn);
    }
}
