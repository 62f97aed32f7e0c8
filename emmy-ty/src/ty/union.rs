use std::sync::Arc;

use super::{Ty, TyMultipleResults};

impl Ty {
    /// Union of two types.
    ///
    /// `Unknown` absorbs everything and `Void` is the identity. Nested unions
    /// are flattened, duplicates removed, and a literal is dropped once its
    /// primitive is part of the union.
    pub fn union(&self, other: &Ty) -> Ty {
        match (self, other) {
            (Ty::Unknown, _) | (_, Ty::Unknown) => Ty::Unknown,
            (Ty::Void, _) => other.clone(),
            (_, Ty::Void) => self.clone(),
            (Ty::MultipleResults(a), _) => union_multiple(a, &as_multiple(other)),
            (_, Ty::MultipleResults(b)) => union_multiple(&as_multiple(self), b),
            _ if self == other => self.clone(),
            _ => {
                let mut list = Vec::new();
                push_flat(&mut list, self);
                push_flat(&mut list, other);
                from_list(list)
            }
        }
    }

    pub fn union_all(tys: impl IntoIterator<Item = Ty>) -> Ty {
        tys.into_iter().fold(Ty::Void, |acc, ty| acc.union(&ty))
    }

    /// Union of the given members, `Unknown` when there are none.
    pub fn union_or_unknown(tys: impl IntoIterator<Item = Ty>) -> Ty {
        match Ty::union_all(tys) {
            Ty::Void => Ty::Unknown,
            ty => ty,
        }
    }

    /// Members accepted by `keep`; an emptied union becomes `Unknown`.
    pub fn filter_members(&self, mut keep: impl FnMut(&Ty) -> bool) -> Ty {
        let kept: Vec<Ty> = self.members().iter().filter(|t| keep(t)).cloned().collect();
        if kept.len() == self.members().len() {
            return self.clone();
        }
        Ty::union_or_unknown(kept)
    }
}

fn as_multiple(ty: &Ty) -> Arc<TyMultipleResults> {
    match ty {
        Ty::MultipleResults(multi) => multi.clone(),
        other => Arc::new(TyMultipleResults {
            list: vec![other.clone()],
            variadic: false,
        }),
    }
}

fn union_multiple(a: &TyMultipleResults, b: &TyMultipleResults) -> Ty {
    let len = a.list.len().max(b.list.len());
    let at = |multi: &TyMultipleResults, i: usize| -> Ty {
        match multi.list.get(i) {
            Some(ty) => ty.clone(),
            None if multi.variadic => multi.list.last().cloned().unwrap_or(Ty::Nil),
            None => Ty::Nil,
        }
    };
    let list = (0..len).map(|i| at(a, i).union(&at(b, i))).collect();
    Ty::multiple(list, a.variadic || b.variadic)
}

fn push_flat(list: &mut Vec<Ty>, ty: &Ty) {
    match ty {
        Ty::Union(members) => {
            for member in members.iter() {
                push_flat(list, member);
            }
        }
        Ty::Void => {}
        other => {
            if !list.contains(other) {
                list.push(other.clone());
            }
        }
    }
}

fn from_list(mut list: Vec<Ty>) -> Ty {
    let primitives: Vec<Ty> = list
        .iter()
        .filter(|t| matches!(t, Ty::Primitive(_)))
        .cloned()
        .collect();
    list.retain(|t| match t {
        Ty::Literal(kind, _) => !primitives.contains(&Ty::Primitive(*kind)),
        _ => true,
    });
    match list.len() {
        0 => Ty::Unknown,
        1 => list.pop().unwrap_or(Ty::Unknown),
        _ => Ty::Union(list.into()),
    }
}
