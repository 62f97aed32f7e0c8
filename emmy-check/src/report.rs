//! Per-file inference reports.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use emmy_parser::NodeKind;
use emmy_ty::{LuaFile, LuaSettings, Project, StubKey};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Debug, Serialize)]
pub struct DeclarationReport {
    pub name: String,
    pub line: usize,
    /// Rendered type, `None` when nothing could be inferred
    pub ty: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub module: String,
    pub declarations: Vec<DeclarationReport>,
    pub returns: Option<String>,
    pub diagnostics: Vec<DiagnosticReport>,
}

#[derive(Debug, Serialize)]
pub struct KeyReport {
    pub key: &'static str,
    pub names: Vec<String>,
}

/// Expands directories into the `.lua` files below them.
pub fn collect_lua_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && is_lua(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn is_lua(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lua")
}

/// Module names are relative to the first directory given, or to the parent of the first file.
pub fn project_root(paths: &[PathBuf]) -> PathBuf {
    match paths.first() {
        Some(path) if path.is_dir() => path.clone(),
        Some(path) => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from("."),
    }
}

pub fn load_project(paths: &[PathBuf], settings: LuaSettings) -> Result<Project> {
    let root = project_root(paths);
    let project = Project::new(&root, settings).context("Failed to create project")?;
    let files = collect_lua_files(paths)?;
    for file in &files {
        project
            .load_file(file)
            .with_context(|| format!("Failed to load file: {}", file.display()))?;
    }
    tracing::info!(root = %root.display(), files = files.len(), "project loaded");
    Ok(project)
}

pub fn file_report(project: &Project, file: &LuaFile) -> FileReport {
    let tree = &file.tree;
    let declarations = file
        .declarations()
        .into_iter()
        .map(|(name, id)| DeclarationReport {
            name,
            line: tree.range(id).start.line + 1,
            ty: project.infer(file.node(id)).map(|ty| project.render(&ty)),
        })
        .collect();

    let returns = file.return_statement().and_then(|stat| match tree.kind(stat) {
        NodeKind::Return { exprs } => exprs
            .first()
            .and_then(|&expr| project.infer(file.node(expr)))
            .map(|ty| project.render(&ty)),
        _ => None,
    });

    let diagnostics = if project.settings().strict_doc {
        tree.diagnostics()
            .iter()
            .map(|d| DiagnosticReport {
                message: d.message.clone(),
                line: d.range.start.line + 1,
                column: d.range.start.column + 1,
            })
            .collect()
    } else {
        Vec::new()
    };

    FileReport {
        path: file.path.clone(),
        module: file.module.clone(),
        declarations,
        returns,
        diagnostics,
    }
}

/// Reports for every loaded file, ordered by path.
pub fn project_reports(project: &Project) -> Vec<FileReport> {
    let mut files = project.files();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.iter().map(|file| file_report(project, file)).collect()
}

pub fn key_reports(project: &Project) -> Vec<KeyReport> {
    StubKey::ALL
        .iter()
        .map(|&key| KeyReport {
            key: key.name(),
            names: project.index().keys(key),
        })
        .collect()
}
