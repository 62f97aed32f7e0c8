//! EmmyLua type inference engine.
//!
//! A [`Project`] holds parsed Lua files and a symbol index built from them.
//! Types are computed on demand with [`infer`] inside a [`SearchContext`]
//! and turned into display strings with [`render`].
//!
//! ```no_run
//! use emmy_ty::{LuaSettings, Project};
//!
//! let project = Project::new("/workspace", LuaSettings::default())?;
//! let id = project.add_file("/workspace/main.lua", "local answer = 42")?;
//! let file = project.file(id).expect("file was just added");
//! let local = file.find_local("answer").expect("declared above");
//! if let Some(ty) = project.infer(file.node(local)) {
//!     println!("{}", project.render(&ty));
//! }
//! # Ok::<(), emmy_ty::ProjectError>(())
//! ```

pub mod error;
pub mod index;
pub mod infer;
pub mod project;
pub mod render;
pub mod search;
pub mod settings;
pub mod ty;

pub use error::{InferError, ProjectError, SettingsError};
pub use index::{StubKey, SymbolIndex};
pub use infer::infer;
pub use project::{Cancellation, LuaFile, Project};
pub use render::render;
pub use search::{SearchContext, SearchScope};
pub use settings::LuaSettings;
pub use ty::Ty;
