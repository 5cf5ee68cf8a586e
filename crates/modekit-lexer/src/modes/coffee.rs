//! CoffeeScript highlighting rules.

use crate::rules::{KeywordMapper, RuleDef, RuleTable, RuleTableError};
use crate::{TokenKind, Tokenizer};
use once_cell::sync::Lazy;

const IDENTIFIER: &str = r"[$A-Za-z_\x{7f}-\x{ffff}][$\w\x{7f}-\x{ffff}]*";

const KEYWORDS: &str = "this|throw|then|try|typeof|super|switch|return|break|by|continue|\
catch|class|in|instanceof|is|isnt|if|else|extends|for|own|finally|function|while|when|new|\
no|not|delete|debugger|do|loop|of|off|or|on|unless|until|and|yes";

const LANG_CONSTANTS: &str = "true|false|null|undefined|NaN|Infinity";

const ILLEGAL: &str = "case|const|default|function|var|void|with|enum|export|implements|\
interface|let|package|private|protected|public|static|yield";

const SUPPORT_CLASSES: &str = "Array|Boolean|Date|Function|Number|Object|RegExp|ReferenceError|\
String|Error|EvalError|InternalError|RangeError|StopIteration|SyntaxError|TypeError|URIError|\
ArrayBuffer|Float32Array|Float64Array|Int16Array|Int32Array|Int8Array|Uint16Array|\
Uint32Array|Uint8Array|Uint8ClampedArray";

const SUPPORT_FUNCTIONS: &str = "Math|JSON|isNaN|isFinite|parseInt|parseFloat|encodeURI|\
encodeURIComponent|decodeURI|decodeURIComponent|String";

const VARIABLE_LANGUAGE: &str = "window|arguments|prototype|document";

static CLASSIFIER: Lazy<KeywordMapper> = Lazy::new(|| {
    KeywordMapper::new(TokenKind::Identifier)
        .tier(TokenKind::VariableLanguage, VARIABLE_LANGUAGE)
        .tier(TokenKind::SupportFunction, SUPPORT_FUNCTIONS)
        .tier(TokenKind::SupportClass, SUPPORT_CLASSES)
        .tier(TokenKind::InvalidIllegal, ILLEGAL)
        .tier(TokenKind::ConstantLanguage, LANG_CONSTANTS)
        .tier(TokenKind::Keyword, KEYWORDS)
});

/// Identifier classifier shared by the rule table and by callers that need to
/// classify words on their own.
pub fn keyword_mapper() -> KeywordMapper {
    CLASSIFIER.clone()
}

pub fn rule_table() -> Result<RuleTable, RuleTableError> {
    use TokenKind::*;

    let function_def = format!(r"(@?{IDENTIFIER})(\s*)([=:])(\s*)(\([^)]*\))?(\s*)([-=]>)");
    let class_def =
        format!(r"(class)(\s+)({IDENTIFIER})(?:(\s+)(extends)(\s+)(@?{IDENTIFIER}(?:\.{IDENTIFIER})*))?");

    RuleTable::builder()
        .rules(
            "start",
            [
                RuleDef::new(
                    r"(?:0[xX][\da-fA-F]+|(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][+-]?\d+)?)",
                    ConstantNumeric,
                ),
                RuleDef::new("'''", String).next("qdoc"),
                RuleDef::new(r#"""""#, String).next("qqdoc"),
                RuleDef::new("'", String).next("qstring"),
                RuleDef::new(r#"""#, String).next("qqstring"),
                RuleDef::new("`", String).next("js"),
                RuleDef::new("///", StringRegex).next("heregex"),
                RuleDef::new(
                    r"/(?:[^\s/\\\n\[]|\\.|\[(?:\\.|[^\]\\\n])*\])(?:[^/\\\n\[]|\\.|\[(?:\\.|[^\]\\\n])*\])*/[imgy]{0,4}",
                    StringRegex,
                ),
                // Four or more hashes are a line comment, exactly three open a block.
                RuleDef::new("####.*", Comment),
                RuleDef::new("###", Comment).next("comment"),
                RuleDef::new("#.*", Comment),
                RuleDef::groups(
                    function_def,
                    [
                        FunctionName,
                        Text,
                        KeywordOperator,
                        Text,
                        VariableParameter,
                        Text,
                        StorageType,
                    ],
                ),
                RuleDef::groups(
                    r"(\([^)]*\))(\s*)([-=]>)",
                    [VariableParameter, Text, StorageType],
                ),
                RuleDef::groups(
                    class_def,
                    [
                        Keyword,
                        Text,
                        SupportClass,
                        Text,
                        Keyword,
                        Text,
                        SupportClass,
                    ],
                ),
                RuleDef::new(format!("@(?:{IDENTIFIER})?"), Variable),
                RuleDef::classify(IDENTIFIER, keyword_mapper()),
                RuleDef::new(r"[-=]>", StorageType),
                RuleDef::new(r"\.{2,3}", KeywordOperator),
                RuleDef::new(r"[,.]", Punctuation),
                RuleDef::new(
                    r"(?:>>>=?|<<=|>>=|&&=|\|\|=|\?\.|::|--|\+\+|[-+*/%<>&|^!?=]=|[-!*+/%<>=&|^?~:])",
                    KeywordOperator,
                ),
                RuleDef::new(r"[(\[{]", ParenOpen),
                RuleDef::new(r"[)\]}]", ParenClose),
                RuleDef::new(r"\s+", Text),
            ],
        )
        .rules(
            "qdoc",
            [
                RuleDef::new(".*?'''", String).next("start"),
                RuleDef::new(".+", String),
            ],
        )
        .rules(
            "qqdoc",
            [
                RuleDef::new(r#".*?""""#, String).next("start"),
                RuleDef::new(".+", String),
            ],
        )
        .rules(
            "qstring",
            [
                RuleDef::new(r"[^\\']*(?:\\.[^\\']*)*'", String).next("start"),
                RuleDef::new(".+", String),
            ],
        )
        .rules(
            "qqstring",
            [
                RuleDef::new(r#"[^\\"]*(?:\\.[^\\"]*)*""#, String).next("start"),
                RuleDef::new(".+", String),
            ],
        )
        .rules(
            "js",
            [
                RuleDef::new(r"[^\\`]*(?:\\.[^\\`]*)*`", String).next("start"),
                RuleDef::new(".+", String),
            ],
        )
        .rules(
            "heregex",
            [
                RuleDef::new(r".*?///[imgy]{0,4}", StringRegex).next("start"),
                RuleDef::new(r"\s+(?:#.*)?", CommentRegex),
                RuleDef::new(r"\S+", StringRegex),
            ],
        )
        .rule("comment", RuleDef::new("###", Comment).merge().next("start"))
        .default_kind("comment", Comment)
        .build()
}

pub fn tokenizer() -> Result<Tokenizer, RuleTableError> {
    rule_table().map(Tokenizer::new)
}
