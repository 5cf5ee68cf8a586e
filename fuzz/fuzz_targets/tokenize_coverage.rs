#![no_main]
use libfuzzer_sys::fuzz_target;
use modekit_lexer::modes::coffee;
use modekit_lexer::Tokenizer;
use std::sync::OnceLock;

static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let tokenizer = TOKENIZER.get_or_init(|| coffee::tokenizer().expect("coffee rule table"));
    let text = String::from_utf8_lossy(data);

    // Tokens must cover each line exactly, whatever state it starts in.
    let mut state = tokenizer.start_state();
    for line in text.split('\n') {
        let tokens = tokenizer.tokenize_line(state, line);
        assert_eq!(tokens.text(), line);
        let mut column = 0;
        for token in &tokens.tokens {
            assert_eq!(token.start, column);
            column = token.end();
        }
        state = tokens.end_state;
    }
});
