//! Display strings for types.
//!
//! Rendering is bounded: a type already being rendered prints as `{...}`,
//! nesting deeper than [`MAX_DEPTH`] prints as `<...>`, and long member and
//! union lists are truncated with a trailing `...`.

use rustc_hash::FxHashSet;

use crate::infer::members_of;
use crate::search::SearchContext;
use crate::ty::{ClassKind, FunSignature, RecordKey, Ty, TyPrimitiveKind};

const MAX_TABLE_MEMBERS: usize = 10;
const MAX_UNION_MEMBERS: usize = 20;
const MAX_DEPTH: usize = 5;
const MAX_SINGLE_LINE_TABLE_MEMBERS: usize = 3;
const MAX_SINGLE_LINE_UNION_MEMBERS: usize = 5;
const MAX_SINGLE_LINE_GENERIC_PARAMS: usize = 5;

pub fn render(ctx: &SearchContext, ty: &Ty) -> String {
    TyRenderer::new(ctx).render(ty)
}

/// Joins on one line up to `max_on_line` items, one item per line beyond.
fn join_single_line_or_wrap(list: &[String], max_on_line: usize, divider: &str, prefix: &str, suffix: &str) -> String {
    if list.is_empty() {
        return format!("{}{}", prefix, suffix);
    }
    if list.len() <= max_on_line {
        let pad = if prefix.is_empty() { "" } else { " " };
        return format!("{}{}{}{}{}", prefix, pad, list.join(&format!("{} ", divider)), pad, suffix);
    }
    format!("{}\n  {}\n{}", prefix, list.join(&format!("{}\n  ", divider)), suffix)
}

fn needs_parens_in_list(ty: &Ty) -> bool {
    match ty {
        Ty::Function(_) | Ty::MultipleResults(_) => true,
        Ty::GenericParameter(param) => param.bound.is_some(),
        _ => false,
    }
}

fn needs_parens_in_return(ty: &Ty) -> bool {
    match ty {
        Ty::Function(_) | Ty::Union(_) => true,
        Ty::GenericParameter(param) => param.bound.is_some(),
        _ => false,
    }
}

pub struct TyRenderer<'c, 'p> {
    ctx: &'c SearchContext<'p>,
    visited: FxHashSet<Ty>,
}

impl<'c, 'p> TyRenderer<'c, 'p> {
    pub fn new(ctx: &'c SearchContext<'p>) -> Self {
        Self {
            ctx,
            visited: FxHashSet::default(),
        }
    }

    pub fn render(&mut self, ty: &Ty) -> String {
        match ty {
            Ty::Unknown => return "any".to_string(),
            Ty::Void => return "void".to_string(),
            Ty::Nil => return "nil".to_string(),
            Ty::Primitive(kind) => return kind.display_name().to_string(),
            Ty::Literal(TyPrimitiveKind::String, value) => return format!("\"{}\"", value),
            Ty::Literal(_, value) => return value.to_string(),
            _ => {}
        }
        if !self.visited.insert(ty.clone()) {
            return "{...}".to_string();
        }
        let out = if self.visited.len() > MAX_DEPTH {
            "<...>".to_string()
        } else {
            self.render_composite(ty)
        };
        self.visited.remove(ty);
        out
    }

    fn render_composite(&mut self, ty: &Ty) -> String {
        match ty {
            Ty::Class(class) => match class.kind {
                ClassKind::Doc | ClassKind::G => class.name.clone(),
                ClassKind::Anonymous => format!("[local {}]", class.var_name.as_deref().unwrap_or("?")),
                ClassKind::Global => format!("[global {}]", class.var_name.as_deref().unwrap_or("?")),
                ClassKind::SelfType => "self".to_string(),
            },
            Ty::Table(table) => {
                let class = table.class_name();
                let name = if class.starts_with("table@") { "table" } else { class.as_str() };
                let members = members_of(self.ctx, ty);
                let mut list: Vec<String> = members
                    .iter()
                    .take(MAX_TABLE_MEMBERS)
                    .map(|(key, member)| self.render_member(key, member))
                    .collect();
                if members.len() > MAX_TABLE_MEMBERS {
                    list.push("...".to_string());
                }
                format!(
                    "{} {}",
                    name,
                    join_single_line_or_wrap(&list, MAX_SINGLE_LINE_TABLE_MEMBERS, ",", "{", "}")
                )
            }
            Ty::Record(record) => {
                let mut list: Vec<String> = Vec::new();
                for field in record.fields.iter().take(MAX_TABLE_MEMBERS) {
                    let key = match &field.key {
                        RecordKey::Name(name) => name.clone(),
                        RecordKey::Indexer(key) => format!("[{}]", self.render(key)),
                    };
                    list.push(self.render_member(&key, &field.ty));
                }
                if record.fields.len() > MAX_TABLE_MEMBERS {
                    list.push("...".to_string());
                }
                join_single_line_or_wrap(&list, MAX_SINGLE_LINE_TABLE_MEMBERS, ",", "{", "}")
            }
            Ty::Array(base) => {
                let inner = self.render(base);
                if needs_parens_in_return(base) {
                    format!("({})[]", inner)
                } else {
                    format!("{}[]", inner)
                }
            }
            Ty::Function(function) => {
                let signature = function.main_signature(self.ctx);
                format!("fun{}", self.render_signature(&signature))
            }
            Ty::Union(list) => {
                let mut rendered: Vec<String> = Vec::new();
                for member in list.iter() {
                    let s = self.render(member);
                    if s.is_empty() {
                        continue;
                    }
                    let s = if needs_parens_in_list(member) { format!("({})", s) } else { s };
                    if !rendered.contains(&s) {
                        rendered.push(s);
                    }
                }
                if rendered.is_empty() {
                    return "any".to_string();
                }
                let truncated = rendered.len() > MAX_UNION_MEMBERS;
                rendered.truncate(MAX_UNION_MEMBERS);
                if truncated {
                    rendered.push("...".to_string());
                }
                join_single_line_or_wrap(&rendered, MAX_SINGLE_LINE_UNION_MEMBERS, " |", "", "")
            }
            Ty::MultipleResults(multi) => {
                let Some((last, init)) = multi.list.split_last() else {
                    return "void".to_string();
                };
                let mut out: String = init.iter().map(|t| format!("{}, ", self.render(t))).collect();
                let last_rendered = self.render(last);
                if multi.variadic && needs_parens_in_return(last) {
                    out.push_str(&format!("({})", last_rendered));
                } else {
                    out.push_str(&last_rendered);
                }
                if multi.variadic {
                    out.push_str("...");
                }
                out
            }
            Ty::Alias(alias) => {
                let params: Vec<String> = alias.params.iter().map(|p| p.name.clone()).collect();
                format!("{}{}", alias.name, render_generic_params(&params))
            }
            Ty::GenericParameter(param) => match &param.bound {
                Some(bound) => format!("{} : {}", param.name, self.render(bound)),
                None => param.name.clone(),
            },
            Ty::Generic(generic) => {
                let args: Vec<String> = generic.args.iter().map(|a| self.render(a)).collect();
                let base = match &generic.base {
                    Ty::Class(class) => class.name.clone(),
                    Ty::Alias(alias) => alias.name.clone(),
                    other => other.key_id(),
                };
                format!("{}{}", base, render_generic_params(&args))
            }
            other => other.key_id(),
        }
    }

    fn render_member(&mut self, key: &str, ty: &Ty) -> String {
        let rendered = self.render(ty);
        if needs_parens_in_list(ty) {
            format!("{}: ({})", key, rendered)
        } else {
            format!("{}: {}", key, rendered)
        }
    }

    pub fn render_signature(&mut self, signature: &FunSignature) -> String {
        let mut params: Vec<String> = signature
            .params
            .iter()
            .map(|param| {
                let ty = self.render(&param.ty);
                let ty = if needs_parens_in_list(&param.ty) { format!("({})", ty) } else { ty };
                format!("{}{}: {}", param.name, if param.optional { "?" } else { "" }, ty)
            })
            .collect();
        if let Some(vararg) = &signature.vararg {
            params.push(format!("...: {}", self.render(vararg)));
        }
        let mut out = format!("({})", params.join(", "));
        if let Some(returns) = &signature.returns {
            let rendered = self.render(returns);
            if needs_parens_in_return(returns) {
                out.push_str(&format!(": ({})", rendered));
            } else {
                out.push_str(&format!(": {}", rendered));
            }
        }
        out
    }
}

fn render_generic_params(params: &[String]) -> String {
    if params.is_empty() {
        return String::new();
    }
    if params.len() <= MAX_SINGLE_LINE_GENERIC_PARAMS {
        return format!("<{}>", params.join(", "));
    }
    join_single_line_or_wrap(params, MAX_SINGLE_LINE_GENERIC_PARAMS, ",", "<", ">")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::project::Project;
    use crate::settings::LuaSettings;
    use crate::ty::{FunParam, FunctionSignatures, TyFunction, TyGenericParameter};

    fn project() -> Project {
        Project::new("/p", LuaSettings::default()).unwrap()
    }

    #[test]
    fn test_simple_types() {
        let project = project();
        let ctx = project.context();
        assert_eq!(render(&ctx, &Ty::Unknown), "any");
        assert_eq!(render(&ctx, &Ty::string("hi")), "\"hi\"");
        assert_eq!(render(&ctx, &Ty::array(Ty::NUMBER)), "number[]");
        assert_eq!(render(&ctx, &Ty::STRING.union(&Ty::Nil)), "string | nil");
        assert_eq!(render(&ctx, &Ty::array(Ty::STRING.union(&Ty::NUMBER))), "(string | number)[]");
        assert_eq!(render(&ctx, &Ty::generic(Ty::TABLE, vec![Ty::STRING, Ty::NUMBER])), "table<string, number>");
        assert_eq!(render(&ctx, &Ty::multiple(vec![Ty::NUMBER, Ty::STRING], true)), "number, string...");
    }

    #[test]
    fn test_function_signature() {
        let project = project();
        let ctx = project.context();
        let signature = FunSignature {
            colon_call: false,
            params: vec![
                FunParam { name: "a".to_string(), ty: Ty::NUMBER, optional: false },
                FunParam { name: "b".to_string(), ty: Ty::STRING, optional: true },
            ],
            vararg: Some(Ty::BOOLEAN),
            returns: Some(Ty::NUMBER.union(&Ty::Nil)),
            generics: Vec::new(),
        };
        let ty = Ty::function(TyFunction::Doc(Arc::new(FunctionSignatures::single(signature))));
        assert_eq!(render(&ctx, &ty), "fun(a: number, b?: string, ...: boolean): (number | nil)");
    }

    #[test]
    fn test_bounded_generic_parameter() {
        let project = project();
        let ctx = project.context();
        let param = Ty::GenericParameter(Arc::new(TyGenericParameter {
            name: "T".to_string(),
            scope: "fn@0:1".to_string(),
            bound: Some(Ty::class("Base")),
        }));
        assert_eq!(render(&ctx, &param), "T : Base");
        assert_eq!(render(&ctx, &param.union(&Ty::Nil)), "(T : Base) | nil");
    }

    #[test]
    fn test_long_union_wraps() {
        let project = project();
        let ctx = project.context();
        let ty = Ty::union_all((1..=6).map(|i| Ty::number(i.to_string())));
        assert_eq!(render(&ctx, &ty), "\n  1 |\n  2 |\n  3 |\n  4 |\n  5 |\n  6\n");
    }

    #[test]
    fn test_table_members() {
        let project = project();
        let id = project.add_file("/p/m.lua", "local t = { a = 1, b = 'x' }").unwrap();
        let file = project.file(id).unwrap();
        let ty = project.infer(file.node(file.find_local("t").unwrap())).unwrap();
        assert_eq!(project.render(&ty), "table { a: 1, b: \"x\" }");
    }
}
