//! Lexical environments as chains of frames.
//!
//! Frames live in an arena owned by [`Environment`] and are addressed by [`FrameId`].
//! A closure captures the id of the frame it was created in, so a later `define` in that
//! frame is visible to the closure body (which is what makes self- and mutual recursion
//! work) without closures and frames owning each other.
//!
//! Frames are reclaimed by tracing. Every top-level evaluation opens a new generation;
//! frames created during it are "young" and are swept when the evaluation finishes (and
//! periodically during long tail loops), keeping whatever is reachable from older frames,
//! the current frame, the expression being evaluated and the result. Older frames are only
//! reclaimed by [`Environment::collect_garbage`], which keeps what the global frame reaches.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use tracing::{debug, trace};

use crate::Error;
use crate::ast::{NativeProcedure, Procedure, Symbol, Value};
use crate::builtinops::{Arity, OperationFn};
use crate::evaluator::EvalConfig;

new_key_type! {
    /// Handle to one frame of an [`Environment`]
    pub struct FrameId;
}

/// One scope level: bindings plus the enclosing frame
#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<Symbol, Value>,
    parent: Option<FrameId>,
    generation: u64,
}

/// Young frame count that triggers a sweep in the middle of an evaluation
const YOUNG_COLLECT_THRESHOLD: usize = 4096;

/// Arena of frames rooted at a single global frame
pub struct Environment {
    frames: SlotMap<FrameId, Frame>,
    global: FrameId,
    config: EvalConfig,
    generation: u64,
    /// Frames allocated in the current generation that are still alive
    young: usize,
    collect_at: usize,
    /// Values the host handed to the running evaluation
    pinned: Vec<Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with an empty global frame and default limits
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        let mut frames = SlotMap::with_key();
        let global = frames.insert(Frame::default());
        Environment {
            frames,
            global,
            config,
            generation: 0,
            young: 0,
            collect_at: YOUNG_COLLECT_THRESHOLD,
            pinned: Vec::new(),
        }
    }

    /// The root of every frame chain
    pub fn global(&self) -> FrameId {
        self.global
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Number of live frames, the global one included
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, id: FrameId) -> Result<&Frame, Error> {
        self.frames
            .get(id)
            .ok_or_else(|| Error::EvalError("invalid environment frame".into()))
    }

    fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame, Error> {
        self.frames
            .get_mut(id)
            .ok_or_else(|| Error::EvalError("invalid environment frame".into()))
    }

    /// Create a new innermost frame whose parent is `parent`
    pub fn extend(&mut self, parent: FrameId) -> FrameId {
        self.young += 1;
        self.frames.insert(Frame {
            bindings: HashMap::new(),
            parent: Some(parent),
            generation: self.generation,
        })
    }

    /// Bind `name` in `frame` only, shadowing any outer binding
    pub fn define(&mut self, frame: FrameId, name: Symbol, value: Value) -> Result<(), Error> {
        trace!(%name, "define");
        self.frame_mut(frame)?.bindings.insert(name, value);
        Ok(())
    }

    /// Search the chain from `frame` outwards for `name`
    pub fn lookup(&self, frame: FrameId, name: &Symbol) -> Result<Value, Error> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if let Some(value) = frame.bindings.get(name) {
                return Ok(value.clone());
            }
            current = frame.parent;
        }
        Err(Error::UnboundVariable(name.to_string()))
    }

    /// Mutate the nearest existing binding of `name`. Never creates a binding.
    pub fn set(&mut self, frame: FrameId, name: &Symbol, value: Value) -> Result<(), Error> {
        let mut current = Some(frame);
        while let Some(id) = current {
            let frame = self.frame_mut(id)?;
            if let Some(slot) = frame.bindings.get_mut(name) {
                trace!(%name, "set!");
                *slot = value;
                return Ok(());
            }
            current = frame.parent;
        }
        Err(Error::UnboundVariable(name.to_string()))
    }

    /// Look up a name from the global frame
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(self.global, &Symbol::from(name)).ok()
    }

    /// Register a native procedure in the global frame.
    ///
    /// # Example
    /// ```
    /// use minischeme::Error;
    /// use minischeme::ast::Value;
    /// use minischeme::builtinops::Arity;
    /// use minischeme::evaluator::create_global_env;
    ///
    /// fn answer(_args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::integer(42))
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_function("answer", Arity::Exact(0), answer);
    /// // Now (answer) can be called from evaluated expressions
    /// ```
    pub fn register_builtin_function(&mut self, name: &str, arity: Arity, func: OperationFn) {
        let procedure = Procedure::Native(NativeProcedure {
            name: name.to_owned(),
            arity,
            func,
        });
        if let Some(global) = self.frames.get_mut(self.global) {
            global
                .bindings
                .insert(Symbol::from(name), Value::Procedure(Rc::new(procedure)));
        }
    }

    /// Bindings of the global frame, sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings: Vec<(String, Value)> = self
            .frames
            .get(self.global)
            .map(|global| {
                global
                    .bindings
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Start a new generation. Every frame that exists now becomes old and is left alone
    /// by [`Environment::collect_young`]; `pinned` stay reachable until the generation ends.
    pub(crate) fn begin_generation(&mut self, pinned: Vec<Value>) {
        self.generation += 1;
        self.young = 0;
        self.collect_at = YOUNG_COLLECT_THRESHOLD;
        self.pinned = pinned;
    }

    /// Sweep the current generation for the last time, keeping what `result` reaches
    pub(crate) fn finish_generation(&mut self, result: &Value) {
        self.collect_young(&[], &[result]);
        self.pinned.clear();
    }

    /// Whether enough young frames piled up to be worth a sweep
    pub(crate) fn should_collect(&self) -> bool {
        self.young >= self.collect_at
    }

    /// Free the frames of the current generation that nothing live reaches.
    ///
    /// Roots are every older frame, the pinned values, and the given frames and values.
    /// Returns the number of frames freed.
    pub(crate) fn collect_young(&mut self, frames: &[FrameId], values: &[&Value]) -> usize {
        let generation = self.generation;
        let mut root_frames: Vec<FrameId> = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.generation != generation)
            .map(|(id, _)| id)
            .collect();
        root_frames.extend_from_slice(frames);
        let mut root_values: Vec<Value> = self.pinned.clone();
        root_values.extend(values.iter().map(|value| (*value).clone()));

        let live = self.reachable_frames(root_frames, root_values);
        let before = self.frames.len();
        self.frames
            .retain(|id, frame| frame.generation != generation || live.contains(&id));
        let freed = before - self.frames.len();

        self.young -= freed;
        self.collect_at = (2 * self.young).max(YOUNG_COLLECT_THRESHOLD);
        trace!(freed, survivors = self.young, "young frames swept");
        freed
    }

    /// Free every frame the global frame can no longer reach, whatever its age.
    ///
    /// Closures and frames held only by the host (a procedure value kept from an earlier
    /// evaluation, a frame made with [`Environment::extend`]) are not roots here; using them
    /// afterwards yields an "invalid environment frame" error. Returns the number of frames
    /// freed.
    pub fn collect_garbage(&mut self) -> usize {
        let live = self.reachable_frames(vec![self.global], self.pinned.clone());
        let before = self.frames.len();
        self.frames.retain(|id, _| live.contains(&id));
        let freed = before - self.frames.len();

        self.young = self
            .frames
            .values()
            .filter(|frame| frame.generation == self.generation)
            .count();
        debug!(freed, live = self.frames.len(), "frames collected");
        freed
    }

    /// Mark every frame reachable from the roots through parent links, bindings, pairs
    /// and closures
    fn reachable_frames(&self, frames: Vec<FrameId>, values: Vec<Value>) -> HashSet<FrameId> {
        let mut live = HashSet::new();
        let mut seen: HashSet<*const ()> = HashSet::new();
        let mut pending_frames = frames;
        let mut pending_values = values;

        loop {
            if let Some(id) = pending_frames.pop() {
                if !live.insert(id) {
                    continue;
                }
                if let Some(frame) = self.frames.get(id) {
                    pending_values.extend(frame.bindings.values().cloned());
                    pending_frames.extend(frame.parent);
                }
            } else if let Some(value) = pending_values.pop() {
                match value {
                    Value::Pair(cell) => {
                        if seen.insert(Rc::as_ptr(&cell).cast()) {
                            pending_values.push(cell.head());
                            pending_values.push(cell.tail());
                        }
                    }
                    Value::Procedure(procedure) => {
                        if let Procedure::Closure(closure) = procedure.as_ref()
                            && seen.insert(Rc::as_ptr(&procedure).cast())
                        {
                            pending_frames.push(closure.env);
                            pending_values.extend(closure.body.iter().cloned());
                        }
                    }
                    _ => {}
                }
            } else {
                break;
            }
        }
        live
    }
}
