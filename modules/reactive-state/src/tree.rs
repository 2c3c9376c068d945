//! Typed lenses over a nested object graph.
//!
//! A [`StateTree`] maps every registered part type to exactly one path from
//! the root. Looking a part up composes the getters along that path by
//! nesting, and the composers by get-modify-put: the child is rewritten
//! through the parent's composer using the parent's own getter to fetch the
//! current parent value.
//!
//! Wholes are passed as `Option<&W>`. Getters short-circuit to `None` as soon
//! as a traversed value is absent; composers fill a missing parent chain with
//! `Default` placeholders so writing into nothing still yields a valid whole.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{StateError, StateResult};

/// Reads part `P` out of an optional whole `W`.
pub type Getter<W, P> = Arc<dyn Fn(Option<&W>) -> Option<P> + Send + Sync>;

/// Writes part `P` into an optional whole `W`, returning the new whole.
pub type Composer<W, P> = Arc<dyn Fn(Option<&W>, P) -> W + Send + Sync>;

type Erased = Box<dyn Any + Send>;
type ErasedGetter<W> = Arc<dyn Fn(Option<&W>) -> Option<Erased> + Send + Sync>;
type ErasedComposer<W> = Arc<dyn Fn(Option<&W>, Erased) -> W + Send + Sync>;

type PartReader<W, P> = Arc<dyn Fn(&W) -> Option<P> + Send + Sync>;
type PartWriter<W, P> = Arc<dyn Fn(W, P) -> W + Send + Sync>;

/// Bound shared by every type stored in a state tree.
pub trait TreeValue: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> TreeValue for T {}

trait TreeNode<W>: Send + Sync {
    fn part(&self) -> (TypeId, &'static str);

    fn collect_parts(&self, out: &mut Vec<(TypeId, &'static str)>);

    fn find_getter(&self, part: TypeId) -> Option<ErasedGetter<W>>;

    fn find_composer(&self, part: TypeId) -> Option<ErasedComposer<W>>;
}

struct Node<W, P> {
    read: PartReader<W, P>,
    write: PartWriter<W, P>,
    children: Vec<Arc<dyn TreeNode<P>>>,
}

impl<W: TreeValue, P: TreeValue> TreeNode<W> for Node<W, P> {
    fn part(&self) -> (TypeId, &'static str) {
        (TypeId::of::<P>(), std::any::type_name::<P>())
    }

    fn collect_parts(&self, out: &mut Vec<(TypeId, &'static str)>) {
        out.push(self.part());
        for child in &self.children {
            child.collect_parts(out);
        }
    }

    fn find_getter(&self, part: TypeId) -> Option<ErasedGetter<W>> {
        let read = self.read.clone();

        if part == TypeId::of::<P>() {
            return Some(Arc::new(move |whole: Option<&W>| {
                whole.and_then(|w| read(w)).map(|p| Box::new(p) as Erased)
            }));
        }

        self.children.iter().find_map(|child| {
            let inner = child.find_getter(part)?;
            let read = read.clone();
            Some(Arc::new(move |whole: Option<&W>| {
                let parent = whole.and_then(|w| read(w));
                inner(parent.as_ref())
            }) as ErasedGetter<W>)
        })
    }

    fn find_composer(&self, part: TypeId) -> Option<ErasedComposer<W>> {
        let write = self.write.clone();

        if part == TypeId::of::<P>() {
            return Some(Arc::new(move |whole: Option<&W>, value: Erased| {
                let base = whole.cloned().unwrap_or_default();
                match value.downcast::<P>() {
                    Ok(value) => write(base, *value),
                    Err(_) => base,
                }
            }));
        }

        let read = self.read.clone();
        self.children.iter().find_map(|child| {
            let inner = child.find_composer(part)?;
            let read = read.clone();
            let write = write.clone();
            Some(Arc::new(move |whole: Option<&W>, value: Erased| {
                let parent = whole.and_then(|w| read(w));
                let parent = inner(parent.as_ref(), value);
                write(whole.cloned().unwrap_or_default(), parent)
            }) as ErasedComposer<W>)
        })
    }
}

/// Frozen lens tree rooted at `W`.
pub struct StateTree<W> {
    children: Vec<Arc<dyn TreeNode<W>>>,
}

impl<W> Clone for StateTree<W> {
    fn clone(&self) -> Self {
        Self {
            children: self.children.clone(),
        }
    }
}

impl<W: TreeValue> StateTree<W> {
    pub fn builder() -> StateTreeBuilder<W> {
        StateTreeBuilder::new()
    }

    /// Getter for `P`, or `None` if `P` was never registered.
    pub fn find_getter<P: Send + 'static>(&self) -> Option<Getter<W, P>> {
        let erased = self.erased_getter(TypeId::of::<P>())?;
        Some(Arc::new(move |whole: Option<&W>| {
            erased(whole)
                .and_then(|value| value.downcast::<P>().ok())
                .map(|value| *value)
        }))
    }

    /// Composer for `P`, or `None` if `P` was never registered.
    pub fn find_composer<P: Send + 'static>(&self) -> Option<Composer<W, P>> {
        let erased = self.erased_composer(TypeId::of::<P>())?;
        Some(Arc::new(move |whole: Option<&W>, part: P| {
            erased(whole, Box::new(part))
        }))
    }

    pub fn getter<P: Send + 'static>(&self) -> StateResult<Getter<W, P>> {
        self.find_getter().ok_or_else(unregistered::<P>)
    }

    pub fn composer<P: Send + 'static>(&self) -> StateResult<Composer<W, P>> {
        self.find_composer().ok_or_else(unregistered::<P>)
    }

    /// Getter and composer for `P` bundled together.
    pub fn lens<P: Send + 'static>(&self) -> StateResult<Lens<W, P>> {
        Ok(Lens {
            getter: self.getter()?,
            composer: self.composer()?,
        })
    }

    /// Read `P`, falling back to `P::default()` when any step is absent.
    pub fn get_or_default<P: Default + Send + 'static>(&self, whole: Option<&W>) -> StateResult<P> {
        let getter = self.getter::<P>()?;
        Ok(getter(whole).unwrap_or_default())
    }

    /// Every part type reachable from the root, in depth-first order.
    pub fn parts(&self) -> Vec<&'static str> {
        self.collect().into_iter().map(|(_, name)| name).collect()
    }

    fn collect(&self) -> Vec<(TypeId, &'static str)> {
        let mut parts = vec![(TypeId::of::<W>(), std::any::type_name::<W>())];
        for child in &self.children {
            child.collect_parts(&mut parts);
        }
        parts
    }

    fn erased_getter(&self, part: TypeId) -> Option<ErasedGetter<W>> {
        if part == TypeId::of::<W>() {
            return Some(Arc::new(|whole: Option<&W>| {
                whole.cloned().map(|w| Box::new(w) as Erased)
            }));
        }
        self.children
            .iter()
            .find_map(|child| child.find_getter(part))
    }

    fn erased_composer(&self, part: TypeId) -> Option<ErasedComposer<W>> {
        if part == TypeId::of::<W>() {
            return Some(Arc::new(|whole: Option<&W>, value: Erased| {
                match value.downcast::<W>() {
                    Ok(value) => *value,
                    Err(_) => whole.cloned().unwrap_or_default(),
                }
            }));
        }
        self.children
            .iter()
            .find_map(|child| child.find_composer(part))
    }
}

impl<W: TreeValue> fmt::Debug for StateTree<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("parts", &self.parts())
            .finish()
    }
}

/// Accumulates child relations of `W` until [`build`](Self::build).
pub struct StateTreeBuilder<W> {
    children: Vec<Arc<dyn TreeNode<W>>>,
}

impl<W: TreeValue> StateTreeBuilder<W> {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Register `P` as a direct, always-present part of `W`.
    pub fn with<P, G, C>(self, getter: G, composer: C) -> Self
    where
        P: TreeValue,
        G: Fn(&W) -> P + Send + Sync + 'static,
        C: Fn(W, P) -> W + Send + Sync + 'static,
    {
        self.push(Arc::new(move |w: &W| Some(getter(w))), Arc::new(composer), Vec::new())
    }

    /// Register `P` as a direct part of `W` that may be absent.
    pub fn with_optional<P, G, C>(self, getter: G, composer: C) -> Self
    where
        P: TreeValue,
        G: Fn(&W) -> Option<P> + Send + Sync + 'static,
        C: Fn(W, P) -> W + Send + Sync + 'static,
    {
        self.push(Arc::new(getter), Arc::new(composer), Vec::new())
    }

    /// Graft `subtree` beneath a new relation, exposing all of its
    /// descendants through `W`.
    pub fn with_subtree<P, G, C>(self, getter: G, composer: C, subtree: &StateTree<P>) -> Self
    where
        P: TreeValue,
        G: Fn(&W) -> P + Send + Sync + 'static,
        C: Fn(W, P) -> W + Send + Sync + 'static,
    {
        self.push(
            Arc::new(move |w: &W| Some(getter(w))),
            Arc::new(composer),
            subtree.children.clone(),
        )
    }

    pub fn with_optional_subtree<P, G, C>(
        self,
        getter: G,
        composer: C,
        subtree: &StateTree<P>,
    ) -> Self
    where
        P: TreeValue,
        G: Fn(&W) -> Option<P> + Send + Sync + 'static,
        C: Fn(W, P) -> W + Send + Sync + 'static,
    {
        self.push(Arc::new(getter), Arc::new(composer), subtree.children.clone())
    }

    /// Freeze the tree. Fails if any part type is reachable twice.
    pub fn build(self) -> StateResult<StateTree<W>> {
        let tree = StateTree {
            children: self.children,
        };

        let mut seen = HashMap::new();
        for (id, name) in tree.collect() {
            if seen.insert(id, name).is_some() {
                return Err(StateError::DuplicatePart { part: name });
            }
        }

        Ok(tree)
    }

    fn push<P: TreeValue>(
        mut self,
        read: PartReader<W, P>,
        write: PartWriter<W, P>,
        children: Vec<Arc<dyn TreeNode<P>>>,
    ) -> Self {
        self.children.push(Arc::new(Node {
            read,
            write,
            children,
        }));
        self
    }
}

impl<W: TreeValue> Default for StateTreeBuilder<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Getter and composer for one part of `W`.
pub struct Lens<W, P> {
    getter: Getter<W, P>,
    composer: Composer<W, P>,
}

impl<W, P> Clone for Lens<W, P> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            composer: self.composer.clone(),
        }
    }
}

impl<W, P> Lens<W, P> {
    pub fn get(&self, whole: Option<&W>) -> Option<P> {
        (self.getter)(whole)
    }

    pub fn set(&self, whole: Option<&W>, part: P) -> W {
        (self.composer)(whole, part)
    }

    /// Rewrite the part with `f`, which sees the current part if present.
    pub fn update(&self, whole: Option<&W>, f: impl FnOnce(Option<P>) -> P) -> W {
        let part = f(self.get(whole));
        self.set(whole, part)
    }

    pub fn getter(&self) -> &Getter<W, P> {
        &self.getter
    }

    pub fn composer(&self) -> &Composer<W, P> {
        &self.composer
    }
}

fn unregistered<P>() -> StateError {
    StateError::UnregisteredPart {
        part: std::any::type_name::<P>(),
    }
}
