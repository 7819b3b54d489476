use rand::seq::IndexedRandom;
use smol_str::SmolStr;

const URL_SAFE_SYMBOLS: [char; 64] = [
    '_', '-', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Generate a random stack-allocated (`SmolStr` is non-allocating up to 23 bytes) identifier.
/// Shared by every `*Id` newtype across the workspace (orders, trades, ledger entries) so the
/// generation scheme only lives in one place.
pub fn random_id() -> SmolStr {
    const LEN: usize = 23;

    let mut rng = rand::rng();
    let bytes: [u8; LEN] = std::array::from_fn(|_| {
        *URL_SAFE_SYMBOLS
            .choose(&mut rng)
            .expect("URL_SAFE_SYMBOLS is non-empty") as u8
    });

    let as_str = std::str::from_utf8(&bytes).expect("URL_SAFE_SYMBOLS are valid utf8");
    SmolStr::new_inline(as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_ids() {
        assert_ne!(random_id(), random_id());
    }

    #[test]
    fn is_non_allocating_length() {
        assert_eq!(random_id().len(), 23);
    }
}
