use emmy_parser::{FileId, NodeRef};
use emmy_ty::index::{find_class, find_globals};
use emmy_ty::ty::{FunParam, FunSignature, TyVarianceFlags};
use emmy_ty::{infer, LuaSettings, Project, SearchScope, Ty};

fn project() -> Project {
    Project::new("/work", LuaSettings::default()).unwrap()
}

fn local_node(project: &Project, file: FileId, name: &str) -> NodeRef {
    let file = project.file(file).unwrap();
    let id = file
        .find_local(name)
        .unwrap_or_else(|| panic!("no local named {}", name));
    file.node(id)
}

fn infer_local(project: &Project, file: FileId, name: &str) -> Option<Ty> {
    project.infer(local_node(project, file, name))
}

#[test]
fn test_union_absorption_and_reflexivity() {
    let project = project();
    let ctx = project.context();
    assert_eq!(Ty::Unknown.union(&Ty::STRING), Ty::Unknown);
    assert_eq!(Ty::NUMBER.union(&Ty::number("1")), Ty::NUMBER);
    let mixed = Ty::STRING.union(&Ty::Nil);
    assert!(mixed.contravariant_of(&ctx, &mixed, TyVarianceFlags::empty()));
    assert!(Ty::class("Point").contravariant_of(&ctx, &Ty::class("Point"), TyVarianceFlags::STRICT_UNKNOWN));
}

#[test]
fn test_multiple_results_selection() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "local function pair() return 1, 'two' end\nlocal a, b = pair()\nlocal c = (pair())",
        )
        .unwrap();
    assert_eq!(infer_local(&project, id, "a"), Some(Ty::number("1")));
    assert_eq!(infer_local(&project, id, "b"), Some(Ty::string("two")));
    assert_eq!(infer_local(&project, id, "c"), Some(Ty::number("1")));
}

#[test]
fn test_boolean_narrowing() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "---@type boolean\nlocal cond\nlocal x = cond and {} or nil\nlocal y = true and 'yes'\nlocal z = false or 0",
        )
        .unwrap();
    let x = infer_local(&project, id, "x").unwrap();
    assert_eq!(x.members().len(), 2);
    assert!(x.members().iter().any(|m| matches!(m, Ty::Table(_))));
    assert!(x.members().contains(&Ty::Nil));
    assert_eq!(project.render(&x), "table {} | nil");
    assert_eq!(infer_local(&project, id, "y"), Some(Ty::string("yes")));
    assert_eq!(infer_local(&project, id, "z"), Some(Ty::number("0")));
}

#[test]
fn test_self_referential_table_renders() {
    let project = project();
    let id = project.add_file("/work/m.lua", "local t = {}\nt.self = t").unwrap();
    let ty = infer_local(&project, id, "t").unwrap();
    let rendered = project.render(&ty);
    assert!(rendered.contains("{...}"), "got {}", rendered);
}

#[test]
fn test_large_table_is_truncated() {
    let project = project();
    let fields: Vec<String> = (1..=15).map(|i| format!("f{:02} = {}", i, i)).collect();
    let source = format!("local t = {{ {} }}", fields.join(", "));
    let id = project.add_file("/work/m.lua", &source).unwrap();
    let ty = infer_local(&project, id, "t").unwrap();
    let rendered = project.render(&ty);
    assert_eq!(rendered.matches(": ").count(), 10);
    assert!(rendered.contains("f10: 10"));
    assert!(!rendered.contains("f11"));
    assert!(rendered.ends_with("...\n}"));
}

#[test]
fn test_literal_widening() {
    let project = project();
    let id = project
        .add_file("/work/m.lua", "local s = 'hello'\nlocal n = s .. '!'\nlocal m = 1 + 2")
        .unwrap();
    let s = infer_local(&project, id, "s").unwrap();
    assert_eq!(s, Ty::string("hello"));
    assert_eq!(s.widen(), Ty::STRING);
    assert_eq!(infer_local(&project, id, "n"), Some(Ty::STRING));
    assert_eq!(infer_local(&project, id, "m"), Some(Ty::NUMBER));
}

#[test]
fn test_require_across_files() {
    let project = project();
    project.add_file("/work/a.lua", "local M = {}\nM.x = 1\nreturn M").unwrap();
    let b = project
        .add_file("/work/b.lua", "local a = require('a')\nlocal x = a.x")
        .unwrap();
    let x = infer_local(&project, b, "x").unwrap();
    assert_eq!(x, Ty::number("1"));
    assert_eq!(project.render(&x), "1");
}

#[test]
fn test_require_nested_module_path() {
    let project = project();
    project.add_file("/work/net/http.lua", "return { port = 80 }").unwrap();
    let id = project
        .add_file("/work/main.lua", "local http = require('net.http')\nlocal p = http.port")
        .unwrap();
    assert_eq!(infer_local(&project, id, "p"), Some(Ty::number("80")));
}

#[test]
fn test_optional_parameter_matches_shorter_call() {
    let project = project();
    let ctx = project.context();
    let signature = FunSignature {
        colon_call: false,
        params: vec![
            FunParam {
                name: "a".to_string(),
                ty: Ty::NUMBER,
                optional: false,
            },
            FunParam {
                name: "b".to_string(),
                ty: Ty::STRING,
                optional: true,
            },
        ],
        vararg: None,
        returns: None,
        generics: Vec::new(),
    };
    assert!(signature.matches_call(&ctx, &[Ty::NUMBER], TyVarianceFlags::empty()));
    assert!(!signature.matches_call(&ctx, &[Ty::STRING], TyVarianceFlags::empty()));
}

#[test]
fn test_inference_is_idempotent() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "---@class Node\n---@field next Node\nlocal n\nlocal following = n.next.next",
        )
        .unwrap();
    let node = local_node(&project, id, "following");
    let first = project.infer(node);
    let second = project.infer(node);
    assert_eq!(first, Some(Ty::class("Node")));
    assert_eq!(first, second);
    assert!(!project.cache().is_empty());
}

#[test]
fn test_dumb_context_sees_no_index() {
    let project = project();
    project
        .add_file("/work/a.lua", "---@class Shape\nShape = {}")
        .unwrap();
    let ctx = project.context();
    assert!(find_class(&ctx, "Shape").is_some());
    assert_eq!(find_globals(&ctx, "Shape").len(), 1);
    ctx.with_dumb(|ctx| {
        assert!(find_class(ctx, "Shape").is_none());
        assert!(find_globals(ctx, "Shape").is_empty());
        assert_eq!(ctx.scope(), SearchScope::Empty);
    });
}

#[test]
fn test_cancelled_search_yields_nothing() {
    let project = project();
    let id = project.add_file("/work/m.lua", "local x = 1").unwrap();
    let node = local_node(&project, id, "x");
    project.cancellation().cancel();
    assert_eq!(project.infer(node), None);
    project.cancellation().reset();
    assert_eq!(project.infer(node), Some(Ty::number("1")));
}

#[test]
fn test_scope_hides_other_files() {
    let project = project();
    let a = project.add_file("/work/a.lua", "Answer = 42").unwrap();
    let b = project.add_file("/work/b.lua", "local v = Answer").unwrap();
    let node = local_node(&project, b, "v");
    assert_eq!(project.infer(node), Some(Ty::number("42")));

    let ctx = project.context();
    let only_b = SearchScope::Files([b].into_iter().collect());
    let hidden = ctx.with_scope(only_b, |ctx| infer(ctx, node));
    assert_eq!(hidden, None);
    let both = SearchScope::Files([a, b].into_iter().collect());
    assert_eq!(ctx.with_scope(both, |ctx| infer(ctx, node)), Some(Ty::number("42")));
}

#[test]
fn test_edit_changes_inferred_type() {
    let project = project();
    let a = project.add_file("/work/a.lua", "return { v = 1 }").unwrap();
    let b = project
        .add_file("/work/b.lua", "local m = require('a')\nlocal v = m.v")
        .unwrap();
    assert_eq!(infer_local(&project, b, "v"), Some(Ty::number("1")));
    project.update_file(a, "return { v = 'one' }").unwrap();
    assert_eq!(infer_local(&project, b, "v"), Some(Ty::string("one")));
}

#[test]
fn test_generic_method_on_class() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "---@class List<T>\nlocal List = {}\n\n---@return T\nfunction List:first() end\n\n---@type List<string>\nlocal names\nlocal head = names:first()",
        )
        .unwrap();
    assert_eq!(infer_local(&project, id, "head"), Some(Ty::STRING));
}

#[test]
fn test_not_on_multiple_results() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "---@return string|nil, number|nil\nlocal function get() end\nlocal a, b = --[[---@not nil, nil]] get()",
        )
        .unwrap();
    assert_eq!(infer_local(&project, id, "a"), Some(Ty::STRING));
    assert_eq!(infer_local(&project, id, "b"), Some(Ty::NUMBER));
}

#[test]
fn test_alias_members() {
    let project = project();
    let id = project
        .add_file(
            "/work/m.lua",
            "---@class Options\n---@field verbose boolean\n\n---@alias Opts Options\n\n---@type Opts\nlocal o\nlocal v = o.verbose",
        )
        .unwrap();
    assert_eq!(infer_local(&project, id, "v"), Some(Ty::BOOLEAN));
}
