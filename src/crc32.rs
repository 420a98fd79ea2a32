//! CRC-32 over byte slices, reflected IEEE 802.3 polynomial in the zlib/ZIP
//! variant: initial register `0xFFFF_FFFF`, output complemented.
//!
//! Two buffer-update implementations exist: a table-driven scalar loop and a
//! carry-less-multiply fold for CPUs with PCLMULQDQ. Feature detection runs
//! once; afterwards every call goes through the selected function pointer.

use once_cell::sync::Lazy;

const POLYNOMIAL: u32 = 0xEDB8_8320;
const INITIAL: u32 = 0xFFFF_FFFF;

static TABLE: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *entry = crc;
    }
    table
});

type UpdateFn = fn(u32, &[u8]) -> u32;

static UPDATE: Lazy<UpdateFn> = Lazy::new(|| {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if clmul::supported() {
            return clmul::update as UpdateFn;
        }
    }
    update_scalar as UpdateFn
});

/// Single-byte table step. Shared with the ZipCrypto key schedule.
#[inline]
pub(crate) fn update_byte(state: u32, byte: u8) -> u32 {
    TABLE[((state ^ u32::from(byte)) & 0xFF) as usize] ^ (state >> 8)
}

fn update_scalar(mut state: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        state = update_byte(state, byte);
    }
    state
}

/// Incremental CRC-32 hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    state: u32,
}

impl Hasher {
    pub fn new() -> Self {
        Self { state: INITIAL }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.state = (*UPDATE)(self.state, bytes);
    }

    pub fn finalize(self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot CRC-32 of a buffer.
pub fn hash(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod clmul {
    //! Fold-by-four CRC-32 using 128-bit carry-less multiplication.
    //!
    //! Four lanes are folded across 64-byte strides, reduced to one lane,
    //! folded across the remaining 16-byte blocks, then Barrett-reduced to 32
    //! bits. Any tail shorter than 16 bytes goes through the scalar table.

    #[cfg(target_arch = "x86")]
    use core::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64 as arch;

    // x^T mod P folding constants for the reflected polynomial.
    const K1: i64 = 0x0001_5444_2bd4; // 64-byte stride, low qword
    const K2: i64 = 0x0001_c6e4_1596; // 64-byte stride, high qword
    const K3: i64 = 0x0001_7519_97d0; // 16-byte stride, low qword
    const K4: i64 = 0x0000_ccaa_009e; // 16-byte stride, high qword
    const K5: i64 = 0x0001_63cd_6124; // 128 -> 64 bit reduction
    const U: i64 = 0x0001_f701_1641; // Barrett mu
    const P: i64 = 0x0001_db71_0641; // polynomial, 33 bits

    pub(super) fn supported() -> bool {
        is_x86_feature_detected!("pclmulqdq")
            && is_x86_feature_detected!("sse2")
            && is_x86_feature_detected!("sse4.1")
    }

    pub(super) fn update(state: u32, bytes: &[u8]) -> u32 {
        // `supported` was checked before this pointer was installed.
        unsafe { update_clmul(state, bytes) }
    }

    #[inline]
    unsafe fn take16(bytes: &mut &[u8]) -> arch::__m128i {
        debug_assert!(bytes.len() >= 16);
        let lane = unsafe { arch::_mm_loadu_si128(bytes.as_ptr() as *const arch::__m128i) };
        *bytes = &bytes[16..];
        lane
    }

    #[inline]
    #[target_feature(enable = "pclmulqdq", enable = "sse2")]
    unsafe fn fold16(
        lane: arch::__m128i,
        next: arch::__m128i,
        keys: arch::__m128i,
    ) -> arch::__m128i {
        unsafe {
            let lo = arch::_mm_clmulepi64_si128(lane, keys, 0x00);
            let hi = arch::_mm_clmulepi64_si128(lane, keys, 0x11);
            arch::_mm_xor_si128(next, arch::_mm_xor_si128(lo, hi))
        }
    }

    #[target_feature(enable = "pclmulqdq", enable = "sse2", enable = "sse4.1")]
    unsafe fn update_clmul(state: u32, mut bytes: &[u8]) -> u32 {
        if bytes.len() < 64 {
            return super::update_scalar(state, bytes);
        }

        unsafe {
            let mut x3 = take16(&mut bytes);
            let mut x2 = take16(&mut bytes);
            let mut x1 = take16(&mut bytes);
            let mut x0 = take16(&mut bytes);

            // Fold the running register into the first lane.
            x3 = arch::_mm_xor_si128(x3, arch::_mm_cvtsi32_si128(state as i32));

            let k1k2 = arch::_mm_set_epi64x(K2, K1);
            while bytes.len() >= 64 {
                x3 = fold16(x3, take16(&mut bytes), k1k2);
                x2 = fold16(x2, take16(&mut bytes), k1k2);
                x1 = fold16(x1, take16(&mut bytes), k1k2);
                x0 = fold16(x0, take16(&mut bytes), k1k2);
            }

            let k3k4 = arch::_mm_set_epi64x(K4, K3);
            let mut x = fold16(x3, x2, k3k4);
            x = fold16(x, x1, k3k4);
            x = fold16(x, x0, k3k4);

            while bytes.len() >= 16 {
                x = fold16(x, take16(&mut bytes), k3k4);
            }

            // Reduce 128 bits to 64.
            let mask32 = arch::_mm_set_epi32(0, 0, 0, !0);
            let x = arch::_mm_xor_si128(
                arch::_mm_clmulepi64_si128(x, k3k4, 0x10),
                arch::_mm_srli_si128(x, 8),
            );
            let x = arch::_mm_xor_si128(
                arch::_mm_clmulepi64_si128(
                    arch::_mm_and_si128(x, mask32),
                    arch::_mm_set_epi64x(0, K5),
                    0x00,
                ),
                arch::_mm_srli_si128(x, 4),
            );

            // Barrett reduction, 64 -> 32 bits.
            let pu = arch::_mm_set_epi64x(U, P);
            let t1 = arch::_mm_clmulepi64_si128(arch::_mm_and_si128(x, mask32), pu, 0x10);
            let t2 = arch::_mm_clmulepi64_si128(arch::_mm_and_si128(t1, mask32), pu, 0x00);
            let folded = arch::_mm_extract_epi32(arch::_mm_xor_si128(x, t2), 1) as u32;

            if bytes.is_empty() {
                folded
            } else {
                super::update_scalar(folded, bytes)
            }
        }
    }
}
