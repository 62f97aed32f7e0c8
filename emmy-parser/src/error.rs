use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to load Lua grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("Parser returned no tree")]
    NoTree,
}
