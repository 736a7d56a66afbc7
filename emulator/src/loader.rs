//! Reading of PM/0 program listings.
//!
//! A listing is whitespace-separated text where each instruction is three
//! integers in order: opcode, static level, modifier. Reading stops at the
//! end of input or at the first token that is not an integer; a trailing
//! incomplete triplet is dropped. Field ranges are not validated here, an
//! out-of-range opcode only surfaces when the machine fetches it.

use crate::constants::Word;

/// Parse a listing into raw instruction triplets, in reading order.
#[must_use]
pub fn parse_listing(source: &str) -> Vec<[Word; 3]> {
    let fields: Vec<Word> = source
        .split_whitespace()
        .map_while(|token| token.parse().ok())
        .collect();

    fields
        .chunks_exact(3)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_listing_test() {
        let listing = indoc! {"
            1 0 5
            1 0 3
            2 0 1
            9 0 1
            9 0 3
        "};
        assert_eq!(
            parse_listing(listing),
            vec![[1, 0, 5], [1, 0, 3], [2, 0, 1], [9, 0, 1], [9, 0, 3]]
        );
    }

    #[test]
    fn layout_is_insensitive_test() {
        // Fields may be spread over lines however the producer likes
        assert_eq!(
            parse_listing("1 0 5 1\n0\n3"),
            vec![[1, 0, 5], [1, 0, 3]]
        );
    }

    #[test]
    fn stops_at_first_bad_token_test() {
        let listing = indoc! {"
            1 0 5
            7 x 0
            9 0 3
        "};
        assert_eq!(parse_listing(listing), vec![[1, 0, 5]]);
    }

    #[test]
    fn drops_incomplete_triplet_test() {
        assert_eq!(parse_listing("1 0 5 9 0"), vec![[1, 0, 5]]);
    }

    #[test]
    fn negative_fields_test() {
        assert_eq!(parse_listing("1 0 -42"), vec![[1, 0, -42]]);
    }

    #[test]
    fn empty_listing_test() {
        assert_eq!(parse_listing(""), Vec::<[Word; 3]>::new());
    }
}
