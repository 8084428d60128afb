/// Row-major descriptor matrix, one row per keypoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptors {
    /// Real-valued rows compared by Euclidean distance (SIFT).
    Float { dim: usize, data: Vec<f32> },
    /// Bit-string rows compared by Hamming distance (ORB, BRISK).
    Binary { bytes: usize, data: Vec<u8> },
}

impl Descriptors {
    pub fn len(&self) -> usize {
        match self {
            Descriptors::Float { dim, data } if *dim > 0 => data.len() / dim,
            Descriptors::Binary { bytes, data } if *bytes > 0 => data.len() / bytes,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row length in elements: floats for `Float`, bytes for `Binary`.
    pub fn row_len(&self) -> usize {
        match self {
            Descriptors::Float { dim, .. } => *dim,
            Descriptors::Binary { bytes, .. } => *bytes,
        }
    }

    pub fn float_row(&self, i: usize) -> Option<&[f32]> {
        match self {
            Descriptors::Float { dim, data } => data.get(i * dim..(i + 1) * dim),
            Descriptors::Binary { .. } => None,
        }
    }

    pub fn binary_row(&self, i: usize) -> Option<&[u8]> {
        match self {
            Descriptors::Binary { bytes, data } => data.get(i * bytes..(i + 1) * bytes),
            Descriptors::Float { .. } => None,
        }
    }

    /// True when rows of both sets can be compared with each other.
    pub fn is_compatible(&self, other: &Descriptors) -> bool {
        match (self, other) {
            (Descriptors::Float { dim: a, .. }, Descriptors::Float { dim: b, .. }) => a == b,
            (Descriptors::Binary { bytes: a, .. }, Descriptors::Binary { bytes: b, .. }) => a == b,
            _ => false,
        }
    }
}

pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Packs bits LSB-first into a fixed byte array.
pub(crate) struct BitPacker<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> BitPacker<N> {
    pub(crate) fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, bit: bool) {
        if self.len < N * 8 {
            if bit {
                self.bytes[self.len / 8] |= 1 << (self.len % 8);
            }
            self.len += 1;
        }
    }

    pub(crate) fn finish(self) -> [u8; N] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_lengths() {
        let d = Descriptors::Binary {
            bytes: 2,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(d.len(), 3);
        assert_eq!(d.binary_row(1), Some(&[3u8, 4][..]));
        assert_eq!(d.binary_row(3), None);
        assert_eq!(d.float_row(0), None);
    }

    #[test]
    fn packer_sets_lsb_first() {
        let mut p = BitPacker::<2>::new();
        for bit in [true, false, false, false, false, false, false, false, false, true] {
            p.push(bit);
        }
        assert_eq!(p.finish(), [0b0000_0001, 0b0000_0010]);
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming_distance(&[0xFF, 0x00], &[0x0F, 0x01]), 5);
    }
}
