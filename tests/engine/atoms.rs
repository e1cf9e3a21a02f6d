//! Atom interning and lifetime tests

use super::{create_test_context, create_test_runtime};
use qjs_core::{Atom, AtomKind, JsValue, atoms};

#[test]
fn test_intern_twice_then_release_twice() {
    let rt = create_test_runtime();
    let first = rt.new_atom("engine_atoms_foo");
    let second = rt.new_atom("engine_atoms_foo");
    assert_eq!(first, second);
    assert_eq!(rt.atom_ref_count(first), Some(2));

    rt.free_atom(second);
    assert!(rt.is_atom_live(first));
    assert_eq!(rt.atom_ref_count(first), Some(1));

    rt.free_atom(first);
    assert!(!rt.is_atom_live(first));
}

#[test]
fn test_reintern_does_not_grow_table() {
    let rt = create_test_runtime();
    let atom = rt.new_atom("engine_atoms_stable");
    let count = rt.atom_count();
    let again = rt.new_atom_string(&rt.atom_to_string(atom));
    assert_eq!(again, atom);
    assert_eq!(rt.atom_count(), count);
    rt.free_atom(again);
    rt.free_atom(atom);
}

#[test]
fn test_predefined_atoms_are_constant() {
    let rt = create_test_runtime();
    assert_eq!(rt.new_atom("length"), atoms::LENGTH);
    assert_eq!(rt.atom_ref_count(atoms::LENGTH), None);
    rt.free_atom(atoms::LENGTH);
    rt.free_atom(atoms::LENGTH);
    assert!(rt.is_atom_live(atoms::LENGTH));
    assert_eq!(rt.atom_to_string(atoms::PROTOTYPE), "prototype");
}

#[test]
fn test_integer_names_are_tagged() {
    let rt = create_test_runtime();
    let atom = rt.new_atom("42");
    assert_eq!(atom.tagged_int(), Some(42));
    assert_eq!(Atom::from_index(42), Some(atom));
    assert_eq!(rt.atom_to_string(atom), "42");
    assert_eq!(rt.atom_kind(atom), Some(AtomKind::String));

    // Non-canonical forms stay strings
    let padded = rt.new_atom("042");
    assert_eq!(padded.tagged_int(), None);
    rt.free_atom(padded);
}

#[test]
fn test_symbols_are_unique_global_symbols_shared() {
    let ctx = create_test_context();
    let a = ctx.new_symbol(Some("tag"));
    let b = ctx.new_symbol(Some("tag"));
    assert!(!a.strict_equals(&b));

    let g1 = ctx.symbol_for("app.key");
    let g2 = ctx.symbol_for("app.key");
    assert!(g1.strict_equals(&g2));

    let JsValue::Symbol(sym) = &a else {
        panic!("expected a symbol");
    };
    assert_eq!(ctx.symbol_description(sym), "tag");
    assert_eq!(ctx.runtime().atom_kind(sym.atom()), Some(AtomKind::Symbol));
}

#[test]
fn test_value_atom_round_trip() {
    let ctx = create_test_context();
    let atom = ctx.value_to_atom(&JsValue::from("engine_atoms_key")).unwrap();
    let back = ctx.atom_to_value(atom);
    assert_eq!(back, JsValue::from("engine_atoms_key"));
    ctx.runtime().free_atom(atom);

    let index = ctx.value_to_atom(&JsValue::from(7)).unwrap();
    assert_eq!(index.tagged_int(), Some(7));
    assert_eq!(ctx.atom_to_value(index), JsValue::from("7"));
}
