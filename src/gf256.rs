//! GF(2^8) arithmetic over the primitive polynomial 0x11D.

pub const PRIMITIVE: u16 = 0x11d;

/// Exponent table, doubled so `EXP[log a + log b]` needs no reduction.
pub const EXP: [u8; 512] = build_tables().0;
pub const LOG: [u8; 256] = build_tables().1;

const fn build_tables() -> ([u8; 512], [u8; 256]) {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE;
        }
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    (exp, log)
}

#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

/// Division by zero has no answer in the field; callers get `None`.
pub fn div(a: u8, b: u8) -> Option<u8> {
    if b == 0 {
        return None;
    }
    if a == 0 {
        return Some(0);
    }
    Some(EXP[LOG[a as usize] as usize + 255 - LOG[b as usize] as usize])
}

/// `alpha^power`.
#[inline]
pub fn pow_alpha(power: usize) -> u8 { EXP[power % 255] }

/// Polynomial product, coefficients highest degree first.
pub fn poly_mul(p: &[u8], q: &[u8]) -> Vec<u8> {
    let mut r = vec![0u8; p.len() + q.len() - 1];
    for (j, &qj) in q.iter().enumerate() {
        for (i, &pi) in p.iter().enumerate() {
            r[i + j] ^= mul(pi, qj);
        }
    }
    r
}

/// Horner evaluation, coefficients highest degree first.
pub fn poly_eval(poly: &[u8], x: u8) -> u8 {
    let mut iter = poly.iter();
    let mut y = match iter.next() {
        Some(&c) => c,
        None => return 0,
    };
    for &c in iter {
        y = mul(y, x) ^ c;
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_consistent() {
        assert_eq!(EXP[0], 1);
        assert_eq!(EXP[8], 0x1d);
        for a in 1..=255u16 {
            assert_eq!(EXP[LOG[a as usize] as usize], a as u8);
        }
        assert_eq!(&EXP[255..510], &EXP[0..255]);
    }

    #[test]
    fn mul_div_inverse() {
        for a in 1..=255u16 {
            for b in [1u8, 2, 3, 0x53, 0xca, 0xff] {
                let p = mul(a as u8, b);
                assert_eq!(div(p, b), Some(a as u8));
            }
        }
        assert_eq!(mul(0, 7), 0);
        assert_eq!(div(7, 0), None);
        assert_eq!(div(0, 7), Some(0));
    }

    #[test]
    fn mul_matches_carryless_reduction() {
        fn slow(mut a: u8, mut b: u8) -> u8 {
            let mut r = 0u8;
            while b != 0 {
                if b & 1 != 0 { r ^= a; }
                let carry = a & 0x80 != 0;
                a <<= 1;
                if carry { a ^= (PRIMITIVE & 0xff) as u8; }
                b >>= 1;
            }
            r
        }
        for a in 0..=255u8 {
            for b in [0u8, 1, 2, 0x1d, 0x80, 0xfe] {
                assert_eq!(mul(a, b), slow(a, b));
            }
        }
    }

    #[test]
    fn poly_helpers() {
        // (x + 1)(x + 2) = x^2 + 3x + 2
        assert_eq!(poly_mul(&[1, 1], &[1, 2]), vec![1, 3, 2]);
        assert_eq!(poly_eval(&[1, 3, 2], 1), 0);
        assert_eq!(poly_eval(&[1, 3, 2], 2), 0);
        assert_eq!(poly_eval(&[], 5), 0);
    }
}
