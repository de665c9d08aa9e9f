#![deny(warnings)]

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// End of sentence. Every vocabulary reserves it at row 0.
pub const EOS: utok = 0;
/// Unknown word. Every vocabulary reserves it at row 1.
pub const UNK: utok = 1;

/// Replaces any id outside a table of `rows` entries with [`UNK`].
#[inline]
pub const fn clamp_to_vocab(token: utok, rows: usize) -> utok {
    if (token as usize) < rows {
        token
    } else {
        UNK
    }
}

#[test]
fn test_clamp_to_vocab() {
    assert_eq!(clamp_to_vocab(EOS, 8), EOS);
    assert_eq!(clamp_to_vocab(7, 8), 7);
    assert_eq!(clamp_to_vocab(8, 8), UNK);
    assert_eq!(clamp_to_vocab(utok::MAX, 8), UNK);
}
