//! Optimistic updates as explicit command objects.
//!
//! A command changes local state before the server confirms, and knows how to
//! undo itself. [`Resource::mutate_optimistic`](super::Resource::mutate_optimistic)
//! applies it, awaits the network call, and reverts on failure.

use circle_shared::Id;

pub trait OptimisticCommand<S> {
    /// Change `state` ahead of confirmation, remembering what is needed to undo it.
    fn apply(&mut self, state: &mut S);
    /// Restore exactly what `apply` changed.
    fn revert(&mut self, state: &mut S);
}

/// Remove one item, by id, from a list inside `S`; reinsert it at the same
/// position on revert.
pub struct RemoveById<S, T> {
    id: Id,
    list: fn(&mut S) -> &mut Vec<T>,
    id_of: fn(&T) -> &Id,
    removed: Option<(usize, T)>,
}

impl<S, T> RemoveById<S, T> {
    pub fn new(id: Id, list: fn(&mut S) -> &mut Vec<T>, id_of: fn(&T) -> &Id) -> Self {
        Self {
            id,
            list,
            id_of,
            removed: None,
        }
    }
}

impl<S, T> OptimisticCommand<S> for RemoveById<S, T> {
    fn apply(&mut self, state: &mut S) {
        let list = (self.list)(state);
        if let Some(index) = list.iter().position(|item| (self.id_of)(item) == &self.id) {
            self.removed = Some((index, list.remove(index)));
        }
    }

    fn revert(&mut self, state: &mut S) {
        if let Some((index, item)) = self.removed.take() {
            let list = (self.list)(state);
            if list.iter().any(|existing| (self.id_of)(existing) == &self.id) {
                return;
            }
            let index = index.min(list.len());
            list.insert(index, item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: Id,
    }

    fn rows(state: &mut Vec<Row>) -> &mut Vec<Row> {
        state
    }

    fn row_id(row: &Row) -> &Id {
        &row.id
    }

    fn ids(state: &[Row]) -> Vec<&str> {
        state.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn revert_restores_position() {
        let mut state: Vec<Row> = ["a", "b", "c"].into_iter().map(|id| Row { id: id.into() }).collect();
        let mut command = RemoveById::new(Id::from("b"), rows, row_id);

        command.apply(&mut state);
        assert_eq!(ids(&state), ["a", "c"]);

        command.revert(&mut state);
        assert_eq!(ids(&state), ["a", "b", "c"]);
    }

    #[test]
    fn missing_item_is_a_no_op() {
        let mut state = vec![Row { id: "a".into() }];
        let mut command = RemoveById::new(Id::from("z"), rows, row_id);
        command.apply(&mut state);
        command.revert(&mut state);
        assert_eq!(ids(&state), ["a"]);
    }
}
