//! 字句トークナイザ — ジョブ制御コアの外側に置かれた薄い協調者。
//! Launcher が消費するトークン列（単語、`|`、`<`、`>`、末尾の `&`）を
//! 生成する、最小限の分割器。
//!
//! 意図的に実装していないもの: クォート/エスケープ、`$VAR` 展開、
//! グロブ、コマンド置換、`&&`/`||`/`;`。

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Pipe,
    Lt,
    Gt,
    Amp,
}

/// `line` をフラットなトークン列に分割する。演算子は単語にくっついて
/// いても（`ls|wc`、`cat<in`）、空白で区切られていてもよい。
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    };

    for ch in line.chars() {
        match ch {
            '|' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Pipe);
            }
            '<' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Lt);
            }
            '>' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Gt);
            }
            '&' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Amp);
            }
            c if c.is_whitespace() => {
                flush(&mut word, &mut tokens);
            }
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

/// 末尾の `&`（バックグラウンドマーカー）を取り除き、存在したかどうかを
/// 返す。Launcher がトークンを見る前に一度だけ行う。
pub fn strip_background(tokens: &mut Vec<Token>) -> bool {
    if tokens.last() == Some(&Token::Amp) {
        tokens.pop();
        true
    } else {
        false
    }
}

/// トークン列を `|` でステージごとのトークン列に分割する。
pub fn split_stages(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    for tok in tokens {
        if tok == Token::Pipe {
            stages.push(std::mem::take(&mut current));
        } else {
            current.push(tok);
        }
    }
    stages.push(current);
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words_and_operators() {
        let toks = tokenize("cat < in.txt | head -n 3 > out.txt &");
        assert_eq!(
            toks,
            vec![
                Token::Word("cat".into()),
                Token::Lt,
                Token::Word("in.txt".into()),
                Token::Pipe,
                Token::Word("head".into()),
                Token::Word("-n".into()),
                Token::Word("3".into()),
                Token::Gt,
                Token::Word("out.txt".into()),
                Token::Amp,
            ]
        );
    }

    #[test]
    fn operators_glued_to_words() {
        let toks = tokenize("yes|head");
        assert_eq!(
            toks,
            vec![
                Token::Word("yes".into()),
                Token::Pipe,
                Token::Word("head".into()),
            ]
        );
    }

    #[test]
    fn strip_background_marker() {
        let mut toks = tokenize("sleep 10 &");
        assert!(strip_background(&mut toks));
        assert_eq!(toks, vec![Token::Word("sleep".into()), Token::Word("10".into())]);

        let mut toks2 = tokenize("sleep 10");
        assert!(!strip_background(&mut toks2));
    }

    #[test]
    fn split_stages_by_pipe() {
        let toks = tokenize("a | b | c");
        let stages = split_stages(toks);
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1], vec![Token::Word("b".into())]);
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(tokenize("   ").is_empty());
    }
}
