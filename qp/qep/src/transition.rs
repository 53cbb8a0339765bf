//! State transition handling
//!
//! Computes the exit and entry sequence of a transition from `source` to
//! `target`. Exits happen while the least common ancestor is searched; the
//! states still to be entered are returned innermost first.

use crate::hsm::{exit, push, superstate, Path};
use crate::QStateMachine;

pub(crate) fn tran<M>(me: &mut M, source: M::State, target: M::State, ctx: &M::Context) -> Path<M::State>
where
    M: QStateMachine + ?Sized,
{
    let mut path: Path<M::State> = Path::new();
    push(&mut path, target);

    // self-transition
    if source == target {
        exit(me, source, ctx);
        return path;
    }

    let target_super = superstate(me, target, ctx);
    // source is the superstate of target
    if source == target_super {
        return path;
    }

    let source_super = superstate(me, source, ctx);
    // siblings
    if source_super == target_super {
        exit(me, source, ctx);
        return path;
    }
    // target is the superstate of source
    if source_super == target {
        exit(me, source, ctx);
        path.clear();
        return path;
    }

    // record the ancestry of target, stopping if source shows up in it
    let mut s = target_super;
    while s != M::TOP {
        push(&mut path, s);
        s = superstate(me, s, ctx);
        if s == source {
            return path;
        }
    }

    exit(me, source, ctx);

    // walk outward from source until a state in target's ancestry is found
    let mut lca = source_super;
    loop {
        if lca == M::TOP {
            return path;
        }
        if let Some(ix) = path.iter().position(|&s| s == lca) {
            path.truncate(ix);
            return path;
        }
        exit(me, lca, ctx);
        lca = superstate(me, lca, ctx);
    }
}
