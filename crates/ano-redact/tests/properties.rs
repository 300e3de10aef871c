use ano_redact::{
    AnonymizerOptions, ChunkTransformer, ContentAnonymizer, TermSet, TextClassifier, redact_path,
};
use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;

fn transformer(path: &str, terms: Vec<String>) -> ChunkTransformer {
    let anonymizer = ContentAnonymizer::new(&AnonymizerOptions {
        terms,
        redact_images: false,
        redact_links: false,
        ..Default::default()
    });
    ChunkTransformer::new(path, Arc::new(TextClassifier::default()), Arc::new(anonymizer))
}

/// Feed `data` in chunks of the given sizes and collect the output.
fn run(mut t: ChunkTransformer, data: &[u8], sizes: &[usize]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut sizes = sizes.iter().cycle();
    while offset < data.len() {
        let size = (*sizes.next().unwrap_or(&1)).max(1);
        let end = (offset + size).min(data.len());
        out.extend_from_slice(&t.push(Bytes::copy_from_slice(&data[offset..end])));
        offset = end;
    }
    if let Some(rest) = t.finish() {
        out.extend_from_slice(&rest);
    }
    out
}

proptest! {
    #[test]
    fn prop_redact_path_is_idempotent(
        terms in prop::collection::vec("[a-z]{3,8}", 1..4),
        segments in prop::collection::vec("[a-zA-Z0-9_.-]{1,12}", 1..5),
    ) {
        prop_assume!(terms.iter().all(|t| t != "xxxx"));
        let set = TermSet::new(&terms, "XXXX");
        let path = segments.join("/");
        let (once, _) = redact_path(&path, &set);
        let (twice, modified) = redact_path(&once, &set);
        prop_assert_eq!(&twice, &once);
        prop_assert!(!modified);
    }

    #[test]
    fn prop_text_without_terms_is_byte_identical(
        text in "[a-z ,.\n]{0,400}",
        sizes in prop::collection::vec(1usize..64, 1..8),
    ) {
        let t = transformer("notes.txt", vec!["term9".to_string()]);
        let state = t.state();
        let out = run(t, text.as_bytes(), &sizes);
        prop_assert_eq!(out, text.as_bytes().to_vec());
        prop_assert!(!state.was_modified());
    }

    #[test]
    fn prop_binary_passes_through(
        data in prop::collection::vec(any::<u8>(), 0..512),
        sizes in prop::collection::vec(1usize..64, 1..8),
    ) {
        let t = transformer("image.png", vec!["a".to_string()]);
        let out = run(t, &data, &sizes);
        prop_assert_eq!(out, data);
    }

    #[test]
    fn prop_unicode_survives_chunking(
        text in "[a-zé€😀 ]{0,200}",
        sizes in prop::collection::vec(1usize..7, 1..8),
    ) {
        let t = transformer("notes.txt", Vec::new());
        let out = run(t, text.as_bytes(), &sizes);
        prop_assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn prop_term_never_survives_single_chunk(
        prefix in "[0-9 ]{0,40}",
        suffix in "[0-9 ]{0,40}",
    ) {
        let content = format!("{} secretorg {}", prefix, suffix);
        let anonymizer = ContentAnonymizer::new(&AnonymizerOptions {
            terms: vec!["secretorg".to_string()],
            ..Default::default()
        });
        let out = anonymizer.anonymize(&content);
        prop_assert!(!out.text.to_lowercase().contains("secretorg"));
        prop_assert!(out.modified());
    }

    #[test]
    fn prop_masks_are_distinct(
        first in "[a-z]{3,8}",
        second in "[a-z]{3,8}",
    ) {
        prop_assume!(first != second);
        prop_assume!([&first, &second].iter().all(|t| *t != "xxxx" && *t != "and"));
        let anonymizer = ContentAnonymizer::new(&AnonymizerOptions {
            terms: vec![first.clone(), second.clone()],
            ..Default::default()
        });
        let input = format!("{} and {}", first, second);
        let out = anonymizer.anonymize(&input);
        prop_assert_eq!(out.text, "XXXX-1 and XXXX-2");
    }
}
