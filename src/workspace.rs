use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::thread::LocalKey;

/// Per-thread scratch storage for integrands, keyed by type.
///
/// Integrands evaluate many points of the same element in a row, so the most recently used
/// entry is checked before scanning the rest.
#[derive(Debug, Default)]
pub struct Workspace {
    entries: Vec<(TypeId, Box<dyn Any>)>,
    last_used: Option<usize>,
}

impl Workspace {
    fn position<W: 'static>(&self) -> Option<usize> {
        let id = TypeId::of::<W>();
        self.last_used
            .filter(|&idx| self.entries[idx].0 == id)
            .or_else(|| self.entries.iter().position(|(entry_id, _)| *entry_id == id))
    }

    pub fn get_or_insert_with<W, F>(&mut self, create: F) -> &mut W
    where
        W: 'static,
        F: FnOnce() -> W,
    {
        let idx = match self.position::<W>() {
            Some(idx) => idx,
            None => {
                self.entries.push((TypeId::of::<W>(), Box::new(create())));
                self.entries.len() - 1
            }
        };
        self.last_used = Some(idx);
        self.entries[idx]
            .1
            .downcast_mut()
            .expect("entry is keyed by its own TypeId")
    }

    pub fn get_or_default<W>(&mut self) -> &mut W
    where
        W: 'static + Default,
    {
        self.get_or_insert_with(W::default)
    }
}

/// Runs `f` on the scratch object of type `W` held by the given thread-local workspace.
///
/// # Panics
///
/// Panics if called re-entrantly on the same thread-local workspace.
pub fn with_thread_local_workspace<W, T, F>(workspace: &'static LocalKey<RefCell<Workspace>>, f: F) -> T
where
    W: 'static + Default,
    F: FnOnce(&mut W) -> T,
{
    workspace.with(|cell| f(cell.borrow_mut().get_or_default::<W>()))
}

#[macro_export]
#[doc(hidden)]
macro_rules! define_thread_local_workspace {
    ($variable_name:ident) => {
        thread_local! {
            static $variable_name: std::cell::RefCell<$crate::workspace::Workspace> = std::cell::RefCell::new(Default::default());
        }
    };
}
