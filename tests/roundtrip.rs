use bytebpe::{
    io::{self, SymbolMode},
    split_documents, utok, Bpe, SpecialTokens, TrainConfig, Tokenizer, Trainer, Vocab,
};
use std::{fs, sync::Arc};

const CORPUS: &str = "\
The quick brown fox jumps over the lazy dog.<|endoftext|>\
It's the lazy dog's day off; the fox isn't amused.\n\n<|endoftext|>\
Numbers like 1234 and 56 appear here, with tabs\tand  double spaces.<|endoftext|>\
中文文本也会出现，字节级 BPE 可以处理任何字节。<|endoftext|>\
Émigrés café naïve - ünïcödé everywhere 🙂🙂<|endoftext|>";

const SAMPLES: &[&str] = &[
    "",
    "the lazy fox",
    "Hello,   world!\r\n\tIndented",
    "中文和 English 混合",
    "emoji 🙂 and ZWJ 👩‍👩‍👧",
    "<|endoftext|>",
    "before<|endoftext|>after<|endoftext|>",
    "never seen: qzxj ¿¡ \u{0} \u{7f}",
];

fn trained(vocab_size: usize) -> Vocab {
    let config = TrainConfig {
        vocab_size,
        min_frequency: 1,
        special_tokens: vec!["<|endoftext|>".into()],
        ..Default::default()
    };
    bytebpe::train(split_documents(CORPUS, &config.delimiter), &config).unwrap()
}

fn table(pieces: &[&str]) -> Vec<(utok, Vec<u8>)> {
    pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (i as utok, p.as_bytes().to_vec()))
        .collect()
}

#[test]
fn scenario_a_encode_with_given_merges() {
    let vocab = Vocab::load(
        table(&["a", "b", "c", " ", "ab", "ac"]),
        [
            (b"a".to_vec(), b"b".to_vec()),
            (b"a".to_vec(), b"c".to_vec()),
        ],
    )
    .unwrap();
    let tokenizer = Tokenizer::new(vocab, Vec::<String>::new()).unwrap();
    let ids = tokenizer.encode("ab ac").unwrap();
    assert_eq!(ids, [4, 3, 5]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "ab ac");
}

#[test]
fn scenario_b_special_token_is_atomic() {
    let vocab = Vocab::load(table(&["a", "b"]), Vec::<(Vec<u8>, Vec<u8>)>::new()).unwrap();
    let tokenizer = Tokenizer::new(vocab, ["<|endoftext|>"]).unwrap();
    let eot = tokenizer.token_to_id("<|endoftext|>").unwrap();

    assert_eq!(tokenizer.encode("<|endoftext|>").unwrap(), [eot]);
    let ids = tokenizer.encode("a<|endoftext|>b").unwrap();
    assert_eq!(ids, [0, eot, 1]);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "a<|endoftext|>b");
}

#[test]
fn scenario_c_training_picks_most_frequent_pair() {
    let vocab = Trainer::new(1000)
        .with_min_frequency(1)
        .train(["aaab", "aaab"])
        .unwrap();
    let a = vocab.token_id(b"a").unwrap();
    let first = vocab.merges().next().unwrap();
    assert_eq!(first, (a, a));
    assert_eq!(vocab.token_bytes(256), Some(&b"aa"[..]));
}

#[test]
fn trained_vocabulary_round_trips_text() {
    let tokenizer = Tokenizer::new(trained(400), ["<|endoftext|>"]).unwrap();
    assert_eq!(tokenizer.token_to_id("<|endoftext|>"), Some(0));
    for text in SAMPLES {
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), *text, "{ids:?}");
    }
}

#[test]
fn training_is_deterministic() {
    let (a, b) = (trained(420), trained(420));
    assert!(a.iter().eq(b.iter()));
    assert!(a.merges().eq(b.merges()));
}

#[test]
fn training_compresses_frequent_words() {
    let tokenizer = Tokenizer::new(trained(450), ["<|endoftext|>"]).unwrap();
    let text = "the lazy dog";
    assert!(tokenizer.encode(text).unwrap().len() < text.len());
}

#[test]
fn no_adjacent_pair_left_mergeable() {
    let vocab = Arc::new(trained(400));
    let bpe = Bpe::new(vocab.clone()).without_pre_split();
    let tokenizer = Tokenizer::with_method(bpe, SpecialTokens::default());
    for text in SAMPLES {
        let ids = tokenizer.encode(text).unwrap();
        for pair in ids.windows(2) {
            assert_eq!(vocab.merge_rank(pair[0], pair[1]), None, "{text:?}");
        }
    }
}

#[test]
fn special_literal_is_never_split() {
    let tokenizer = Tokenizer::new(trained(400), ["<|endoftext|>", "<pad>"]).unwrap();
    let eot = tokenizer.token_to_id("<|endoftext|>").unwrap();
    let pad = tokenizer.token_to_id("<pad>").unwrap();
    assert_eq!(pad as usize, tokenizer.vocab_size() - 1);

    let ids = tokenizer.encode("x<pad><|endoftext|><pad>y").unwrap();
    assert_eq!(ids.iter().filter(|&&t| t == pad).count(), 2);
    assert_eq!(ids.iter().filter(|&&t| t == eot).count(), 1);
    assert_eq!(tokenizer.decode(&ids).unwrap(), "x<pad><|endoftext|><pad>y");
}

#[test]
fn saved_vocabulary_encodes_identically() {
    let vocab = trained(400);
    let dir = tempfile::tempdir().unwrap();
    io::save(&vocab, dir.path(), SymbolMode::ByteLevel).unwrap();
    let loaded = io::load(dir.path(), SymbolMode::ByteLevel).unwrap();

    assert!(vocab.iter().eq(loaded.iter()));
    assert!(vocab.merges().eq(loaded.merges()));

    let before = Tokenizer::new(vocab, ["<|endoftext|>"]).unwrap();
    let after = Tokenizer::new(loaded, ["<|endoftext|>"]).unwrap();
    for text in SAMPLES {
        assert_eq!(before.encode(text).unwrap(), after.encode(text).unwrap());
    }
}

#[test]
fn vocabulary_files_in_either_form() {
    let dir = tempfile::tempdir().unwrap();
    let merges = dir.path().join("merges.txt");
    fs::write(&merges, "#version: 0.2\nh i\nhi !\n").unwrap();

    let content_to_id = dir.path().join("a.json");
    fs::write(&content_to_id, r#"{"h": 0, "i": 1, "!": 2, "hi": 3, "hi!": 4}"#).unwrap();
    let id_to_content = dir.path().join("b.json");
    fs::write(
        &id_to_content,
        r#"{"0": "h", "1": [105], "2": "!", "3": "hi", "4": "hi!"}"#,
    )
    .unwrap();

    for path in [&content_to_id, &id_to_content] {
        let vocab = io::load_files(path, &merges, SymbolMode::Raw).unwrap();
        assert_eq!(vocab.len(), 5);
        let tokenizer = Tokenizer::new(vocab, Vec::<String>::new()).unwrap();
        assert_eq!(tokenizer.vocab().merge_rank(3, 2), Some(1));
        // "hi" 与 "!" 在预切分时分属两个词
        assert_eq!(tokenizer.encode("hi!").unwrap(), [3, 2]);
    }
}

#[test]
fn unknown_ids_fail_to_decode() {
    let tokenizer = Tokenizer::new(trained(300), ["<|endoftext|>"]).unwrap();
    let bad = tokenizer.vocab_size() as utok;
    assert!(tokenizer.decode(&[bad]).is_err());
}
