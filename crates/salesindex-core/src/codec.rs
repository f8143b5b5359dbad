//! Domain label codec.
//!
//! Labels are packed into a single felt with a mixed-radix scheme over two
//! alphabets. The basic alphabet holds the 37 ASCII symbols a label may use;
//! the extended alphabet holds two CJK glyphs reachable through an escape
//! digit. A trailing run of the last extended glyph (the "star") is folded
//! into a compact canonical form after decoding.

use alloy_primitives::U256;

use crate::types::Felt;

/// Top-level domain appended to every decoded label.
pub const DOMAIN_SUFFIX: &str = "stark";

const BASIC_ALPHABET: &[u8; 37] = b"abcdefghijklmnopqrstuvwxyz0123456789-";
const EXTENDED_ALPHABET: [char; 2] = ['这', '来'];
const STAR: char = EXTENDED_ALPHABET[EXTENDED_ALPHABET.len() - 1];

fn basic(index: usize) -> char {
    BASIC_ALPHABET[index] as char
}

/// Low limb of a value already reduced below a small modulus.
fn digit(reduced: U256) -> usize {
    reduced.as_limbs()[0] as usize
}

/// Decode a packed felt into a domain label (without suffix).
///
/// Total for every input; `decode(0)` is the empty string.
pub fn decode(value: Felt) -> String {
    let basic_size = BASIC_ALPHABET.len();
    let basic_radix = U256::from(basic_size as u64 + 1);
    let extended_size = U256::from(EXTENDED_ALPHABET.len() as u64);
    let extended_radix = U256::from(EXTENDED_ALPHABET.len() as u64 + 1);

    let mut felt = value;
    let mut decoded = String::new();

    while !felt.is_zero() {
        let code = digit(felt % basic_radix);
        felt /= basic_radix;

        if code < basic_size {
            decoded.push(basic(code));
            continue;
        }

        // escape digit
        let next = felt / extended_radix;
        if next.is_zero() {
            let code2 = digit(felt % extended_radix);
            felt = next;
            decoded.push(if code2 == 0 {
                basic(0)
            } else {
                EXTENDED_ALPHABET[code2 - 1]
            });
        } else {
            decoded.push(EXTENDED_ALPHABET[digit(felt % extended_size)]);
            felt /= extended_size;
        }
    }

    let stars = strip_stars(&mut decoded);
    if stars > 0 {
        if stars % 2 == 0 {
            decoded.extend(std::iter::repeat(STAR).take(stars / 2 - 1));
            decoded.push(EXTENDED_ALPHABET[0]);
            decoded.push(basic(1));
        } else {
            decoded.extend(std::iter::repeat(STAR).take(stars / 2 + 1));
        }
    }

    decoded
}

/// Remove the trailing run of stars and return its length.
fn strip_stars(decoded: &mut String) -> usize {
    let mut count = 0;
    while decoded.ends_with(STAR) {
        decoded.pop();
        count += 1;
    }
    count
}

/// Decode every label of a multi-segment domain and append the suffix.
///
/// `[a, b]` becomes `"<a>.<b>.stark"`. An empty slice yields an empty string.
pub fn decode_domain(labels: &[Felt]) -> String {
    let mut domain = String::new();
    for label in labels {
        domain.push_str(&decode(*label));
        domain.push('.');
    }
    if !domain.is_empty() {
        domain.push_str(DOMAIN_SUFFIX);
    }
    domain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn felt(v: u64) -> Felt {
        Felt::from(v)
    }

    #[test]
    fn zero_is_empty() {
        assert_eq!(decode(Felt::ZERO), "");
    }

    #[test]
    fn basic_labels() {
        assert_eq!(decode(felt(1)), "b");
        assert_eq!(decode(felt(2)), "c");
        assert_eq!(decode(felt(36)), "-");
        assert_eq!(decode(felt(38)), "ab");
        assert_eq!(decode(felt(39)), "bb");
        assert_eq!(decode(felt(1_499_566)), "ksm1");
        assert_eq!(decode(felt(18_925_070)), "ga8cj");
        assert_eq!(decode(felt(1_234_567_890)), "08bdwp");
    }

    #[test]
    fn single_overflow_symbol() {
        // escape followed by a zero digit is a trailing 'a'
        assert_eq!(decode(felt(37)), "a");
        assert_eq!(decode(felt(75)), "这");
    }

    #[test]
    fn odd_star_runs() {
        assert_eq!(decode(felt(113)), "来");
        assert_eq!(decode(felt(658_463)), "来来");
        assert_eq!(decode(felt(6_219_461)), "ben来");
        assert_eq!(decode(felt(36_131_200_661)), "ben来来");
        assert_eq!(decode(felt(31_721_491_442_465_410)), "ab来来来来");
    }

    #[test]
    fn even_star_runs() {
        assert_eq!(decode(felt(8_663)), "这b");
        assert_eq!(decode(felt(50_043_263)), "来这b");
        assert_eq!(decode(felt(475_375_061)), "ben这b");
        assert_eq!(decode(felt(2_745_973_946_261)), "ben来这b");
        assert_eq!(decode(felt(15_860_745_721_197_461)), "ben来来这b");
    }

    #[test]
    fn large_values_decode_deterministically() {
        let max = (Felt::from(1u64) << 251usize) - felt(1);
        let first = decode(max);
        assert_eq!(first, "jptynegfk-wb68juvk82nwwcuwbpjofad7849e-7doquvunu");
        assert_eq!(decode(max), first);

        let over = (Felt::from(1u64) << 251usize) + felt(17);
        assert_eq!(decode(over), "1ptynegfk-wb68juvk82nwwcuwbpjofad7849e-7doquvunu");

        assert_eq!(decode(Felt::from(1u64) << 128usize), "eeji-tar3t09-q59eb61ixmfe");
    }

    #[test]
    fn every_small_value_terminates() {
        for v in 0..20_000u64 {
            let label = decode(felt(v));
            assert_eq!(label, decode(felt(v)));
        }
    }

    #[test]
    fn domain_suffix() {
        assert_eq!(decode_domain(&[felt(1_499_566)]), "ksm1.stark");
        assert_eq!(decode_domain(&[felt(1), felt(38)]), "b.ab.stark");
        assert_eq!(decode_domain(&[Felt::ZERO]), ".stark");
        assert_eq!(decode_domain(&[]), "");
    }
}
