//! Hardware Command Module
//!
//! Bit-exact encoders for the command-streamer commands and VEBOX state
//! blocks emitted by the sequencer. Every command is a fixed array of
//! little-endian dwords; fields are declared once in a table of
//! `dword[lo..=hi] = default` entries and the accessors, the default
//! constructor and the layout metadata are generated from that table.

use std::fmt;

/// Layout of a single named field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Index of the dword holding the low bit of the field.
    pub dword: usize,
    /// Bit position of the field inside `dword`.
    pub lo: u32,
    /// Width in bits; fields wider than the remainder of `dword` continue
    /// into the next dword.
    pub width: u32,
    pub default: u64,
}

impl FieldSpec {
    pub const fn new(name: &'static str, dword: usize, lo: u32, width: u32, default: u64) -> Self {
        Self {
            name,
            dword,
            lo,
            width,
            default,
        }
    }

    /// First bit of the field counted from the start of the command.
    pub const fn start_bit(&self) -> usize {
        self.dword * 32 + self.lo as usize
    }

    pub const fn end_bit(&self) -> usize {
        self.start_bit() + self.width as usize
    }

    /// Largest value the field can hold.
    pub const fn max_value(&self) -> u64 {
        mask64(self.width)
    }

    pub fn read(&self, dw: &[u32]) -> u64 {
        read_bits(dw, self.dword, self.lo, self.width)
    }

    pub fn write(&self, dw: &mut [u32], value: u64) {
        write_bits(dw, self.dword, self.lo, self.width, value)
    }
}

pub const fn mask64(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Read `width` bits starting at bit `lo` of `dw[dword]`, spilling into
/// `dw[dword + 1]` when the range crosses the dword boundary.
#[inline]
pub fn read_bits(dw: &[u32], dword: usize, lo: u32, width: u32) -> u64 {
    let mut raw = dw[dword] as u64;
    if lo + width > 32 {
        raw |= (dw[dword + 1] as u64) << 32;
    }
    (raw >> lo) & mask64(width)
}

/// Counterpart of [`read_bits`]. Bits outside the field are preserved.
#[inline]
pub fn write_bits(dw: &mut [u32], dword: usize, lo: u32, width: u32, value: u64) {
    let mask = mask64(width) << lo;
    let spans = lo + width > 32;

    let mut raw = dw[dword] as u64;
    if spans {
        raw |= (dw[dword + 1] as u64) << 32;
    }
    raw = (raw & !mask) | ((value << lo) & mask);

    dw[dword] = raw as u32;
    if spans {
        dw[dword + 1] = (raw >> 32) as u32;
    }
}

/// Compile-time validation of a field table: every field fits the command,
/// every default fits its field and no two fields share a bit.
pub const fn check_layout(fields: &[FieldSpec], dw_size: usize) {
    let mut i = 0;
    while i < fields.len() {
        let f = &fields[i];
        if f.width == 0 || f.width > 64 || f.lo >= 32 || f.lo + f.width > 64 {
            panic!("field has an invalid bit range");
        }
        if f.end_bit() > dw_size * 32 {
            panic!("field extends past the end of the command");
        }
        if f.width < 64 && (f.default >> f.width) != 0 {
            panic!("field default does not fit its width");
        }
        let mut j = i + 1;
        while j < fields.len() {
            let g = &fields[j];
            if f.start_bit() < g.end_bit() && g.start_bit() < f.end_bit() {
                panic!("overlapping fields");
            }
            j += 1;
        }
        i += 1;
    }
}

/// Common interface of every encoded command.
pub trait HwCommand: Copy + Default + fmt::Debug {
    /// Hardware name, as printed in logs.
    const NAME: &'static str;
    const DW_SIZE: usize;
    const BYTE_SIZE: usize = Self::DW_SIZE * 4;
    const FIELDS: &'static [FieldSpec];

    fn dwords(&self) -> &[u32];

    fn dwords_mut(&mut self) -> &mut [u32];

    /// Rebuild a command from raw dwords, `None` if `src` is too short.
    fn from_dwords(src: &[u32]) -> Option<Self>;

    /// Raw view of one dword.
    fn value(&self, index: usize) -> u32 {
        self.dwords()[index]
    }

    fn set_value(&mut self, index: usize, value: u32) {
        self.dwords_mut()[index] = value;
    }

    fn field_spec(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|f| f.name == name)
    }

    /// Read a field by name.
    fn field(&self, name: &str) -> Option<u64> {
        Self::field_spec(name).map(|f| f.read(self.dwords()))
    }

    /// Write a field by name; returns false for unknown fields.
    fn set_field(&mut self, name: &str, value: u64) -> bool {
        match Self::field_spec(name) {
            Some(f) => {
                debug_assert!(value <= f.max_value(), "{}.{} out of range", Self::NAME, f.name);
                f.write(self.dwords_mut(), value);
                true
            }
            None => false,
        }
    }

    /// Serialize little-endian into `out`, which must hold `BYTE_SIZE` bytes.
    fn write_to(&self, out: &mut [u8]) {
        for (chunk, dw) in out.chunks_exact_mut(4).zip(self.dwords()) {
            chunk.copy_from_slice(&dw.to_le_bytes());
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::BYTE_SIZE];
        self.write_to(&mut out);
        out
    }
}

/// Bits of `dword` not claimed by any field.
pub fn reserved_mask(fields: &[FieldSpec], dword: usize) -> u32 {
    let mut covered = 0u64;
    for f in fields {
        let base = dword * 32;
        let start = f.start_bit().max(base);
        let end = f.end_bit().min(base + 32);
        if start < end {
            covered |= mask64((end - start) as u32) << (start - base);
        }
    }
    !(covered as u32)
}

pub(crate) fn debug_fields(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    fields: &[FieldSpec],
    dw: &[u32],
) -> fmt::Result {
    let mut s = f.debug_struct(name);
    for field in fields {
        s.field(field.name, &field.read(dw));
    }
    s.finish()
}

/// Declares a command type from its field table.
///
/// ```ignore
/// hw_command! {
///     pub struct MiNoop("MI_NOOP", 1) {
///         identification_number: 0[0..=21];
///         mi_command_opcode: 0[23..=28];
///         command_type: 0[29..=31];
///     }
/// }
/// ```
///
/// Fields wider than 32 bits go in a trailing `wide { }` block and use
/// `u64` accessors.
macro_rules! hw_command {
    (@default) => { 0u64 };
    (@default $value:expr) => { ($value) as u64 };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($hw_name:literal, $dw:literal) {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $word:literal [ $lo:literal ..= $hi:literal ] $( = $default:expr )? ;
            )*
        }
        $(
            wide {
                $(
                    $(#[$wmeta:meta])*
                    $wfield:ident : $wword:literal [ $wlo:literal ..= $whi:literal ] ;
                )*
            }
        )?
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone, Copy, PartialEq, Eq)]
        $vis struct $name {
            dw: [u32; $dw],
        }

        impl $name {
            pub const DW_SIZE: usize = $dw;
            pub const BYTE_SIZE: usize = $dw * 4;
            pub const FIELDS: &'static [$crate::hwcmd::FieldSpec] = &[
                $(
                    $crate::hwcmd::FieldSpec::new(
                        stringify!($field),
                        $word,
                        $lo,
                        $hi - $lo + 1,
                        hw_command!(@default $($default)?),
                    ),
                )*
                $($(
                    $crate::hwcmd::FieldSpec::new(stringify!($wfield), $wword, $wlo, $whi - $wlo + 1, 0),
                )*)?
            ];

            /// Command with every field at its hardware default.
            pub fn new() -> Self {
                let mut cmd = Self { dw: [0; $dw] };
                for f in Self::FIELDS {
                    if f.default != 0 {
                        f.write(&mut cmd.dw, f.default);
                    }
                }
                cmd
            }

            ::paste::paste! {
                $(
                    $(#[$fmeta])*
                    #[inline]
                    pub fn $field(&self) -> u32 {
                        $crate::hwcmd::read_bits(&self.dw, $word, $lo, $hi - $lo + 1) as u32
                    }

                    #[inline]
                    pub fn [<set_ $field>](&mut self, value: u32) -> &mut Self {
                        debug_assert!(
                            (value as u64) <= $crate::hwcmd::mask64($hi - $lo + 1),
                            concat!($hw_name, ".", stringify!($field), " out of range")
                        );
                        $crate::hwcmd::write_bits(&mut self.dw, $word, $lo, $hi - $lo + 1, value as u64);
                        self
                    }
                )*
                $($(
                    $(#[$wmeta])*
                    #[inline]
                    pub fn $wfield(&self) -> u64 {
                        $crate::hwcmd::read_bits(&self.dw, $wword, $wlo, $whi - $wlo + 1)
                    }

                    #[inline]
                    pub fn [<set_ $wfield>](&mut self, value: u64) -> &mut Self {
                        debug_assert!(
                            value <= $crate::hwcmd::mask64($whi - $wlo + 1),
                            concat!($hw_name, ".", stringify!($wfield), " out of range")
                        );
                        $crate::hwcmd::write_bits(&mut self.dw, $wword, $wlo, $whi - $wlo + 1, value);
                        self
                    }
                )*)?
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                $crate::hwcmd::debug_fields(f, $hw_name, Self::FIELDS, &self.dw)
            }
        }

        impl $crate::hwcmd::HwCommand for $name {
            const NAME: &'static str = $hw_name;
            const DW_SIZE: usize = $dw;
            const FIELDS: &'static [$crate::hwcmd::FieldSpec] = <$name>::FIELDS;

            fn dwords(&self) -> &[u32] {
                &self.dw
            }

            fn dwords_mut(&mut self) -> &mut [u32] {
                &mut self.dw
            }

            fn from_dwords(src: &[u32]) -> Option<Self> {
                let dw: [u32; $dw] = src.get(..$dw)?.try_into().ok()?;
                Some(Self { dw })
            }
        }

        const _: () = $crate::hwcmd::check_layout(<$name>::FIELDS, $dw);
        const _: () = assert!(::std::mem::size_of::<$name>() == $dw * 4);
    };
}

pub mod mi;
pub mod render;
pub mod vebox_g8;
pub mod vebox_g9;
