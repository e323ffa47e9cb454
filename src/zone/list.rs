//! List sub-engine: double-ended push/pop and length over list-typed
//! entries. Elements are charged individually against the zone's byte
//! budget; the owning entry only pays for its header and nested list head.

use tracing::{debug, error};

use crate::ds::{LinkedList, SlotId};
use crate::entry::{Entry, ListElem, Payload};
use crate::error::{Error, Result};
use crate::value::{ListEnd, ListValue, ScalarKind};

use super::core::{hash_key, Found, ZoneCore};

fn encode_elem(value: &ListValue) -> (ScalarKind, Box<[u8]>) {
    match value {
        ListValue::Number(n) => (ScalarKind::Number, Box::new(n.to_le_bytes())),
        ListValue::Str(s) => (ScalarKind::Str, s.clone().into_boxed_slice()),
    }
}

fn decode_elem(elem: &ListElem) -> Result<ListValue> {
    match elem.kind {
        ScalarKind::Str => Ok(ListValue::Str(elem.bytes.to_vec())),
        ScalarKind::Number => {
            let raw: [u8; 8] = elem
                .bytes
                .as_ref()
                .try_into()
                .map_err(|_| Error::corrupt("bad list element number value size"))?;
            Ok(ListValue::Number(f64::from_le_bytes(raw)))
        }
        ScalarKind::Bool => Err(Error::corrupt("bad list element value type")),
    }
}

impl ZoneCore {
    /// Appends `value` at the chosen end of the list under `key`, creating
    /// or reviving the entry as needed. Returns the new element count.
    pub(crate) fn push(
        &mut self,
        now: u64,
        key: &[u8],
        end: ListEnd,
        value: &ListValue,
    ) -> Result<u32> {
        let (kind, bytes) = encode_elem(value);
        let hash = hash_key(key);
        self.reclaim_lazy(now);

        let entry_id = match self.find(now, hash, key) {
            Found::Live(id) => {
                if !self.entries.get(id).is_some_and(Entry::is_list) {
                    return Err(Error::TypeMismatch);
                }
                Some(id)
            }
            Found::Stale(id) => {
                if self.entries.get(id).is_some_and(Entry::is_list) {
                    debug!("push: found stale entry of matching type, reusing it");
                    self.reset_list_entry(id);
                    Some(id)
                } else {
                    debug!("push: found stale entry of another type, removing it first");
                    self.destroy(id);
                    None
                }
            }
            Found::Absent => None,
        };

        let entry_id = match entry_id {
            Some(id) => id,
            None => {
                debug!("push: creating a new list entry");
                if !self.arena.try_charge(Entry::list_charge(key.len())) {
                    return Err(Error::OutOfMemory);
                }
                let id = self
                    .entries
                    .insert(Entry::new_list(hash, key.to_vec().into_boxed_slice()));
                self.index.insert(&mut self.entries, id);
                self.lru.push_front(&mut self.entries, id);
                id
            }
        };

        if !self.arena.try_charge(ListElem::charge(bytes.len())) {
            // a just-created (or just-emptied) entry is useless without its
            // first element; anything else is left exactly as it was
            if self.list_len(entry_id) == Some(0) {
                debug!("push: no memory for element and list is empty, removing entry");
                self.destroy(entry_id);
            }
            return Err(Error::OutOfMemory);
        }

        let elem_id = self.elems.insert(ListElem::new(kind, bytes));
        let Some(entry) = self.entries.get_mut(entry_id) else {
            return Err(Error::corrupt("list entry vanished during push"));
        };
        let Payload::List { elems, len } = &mut entry.payload else {
            return Err(Error::corrupt("list entry payload changed during push"));
        };
        match end {
            ListEnd::Head => elems.push_front(&mut self.elems, elem_id),
            ListEnd::Tail => elems.push_back(&mut self.elems, elem_id),
        }
        *len += 1;
        Ok(*len)
    }

    /// Removes and returns the element at the chosen end. Absent or stale
    /// keys yield `Ok(None)`; popping the last element removes the entry.
    pub(crate) fn pop(&mut self, now: u64, key: &[u8], end: ListEnd) -> Result<Option<ListValue>> {
        let hash = hash_key(key);
        self.reclaim_lazy(now);

        let id = match self.find(now, hash, key) {
            Found::Absent | Found::Stale(_) => return Ok(None),
            Found::Live(id) => id,
        };

        let (elems, len) = match self.entries.get(id) {
            Some(entry) => match &entry.payload {
                Payload::List { elems, len } => (*elems, *len),
                Payload::Scalar { .. } => return Err(Error::TypeMismatch),
            },
            None => return Ok(None),
        };
        if len == 0 {
            error!(
                key = %String::from_utf8_lossy(key),
                "bad list length found for key"
            );
            return Err(Error::corrupt("bad list length"));
        }
        let elem_id = match end {
            ListEnd::Head => elems.head(),
            ListEnd::Tail => elems.tail(),
        };
        let Some(elem_id) = elem_id else {
            return Err(Error::corrupt("bad list length"));
        };

        // decode before unlinking so a corrupt element leaves the list intact
        let value = match self.elems.get(elem_id) {
            Some(elem) => decode_elem(elem).inspect_err(|_| {
                error!(
                    key = %String::from_utf8_lossy(key),
                    "bad list element found for key"
                );
            })?,
            None => return Err(Error::corrupt("list element vanished")),
        };

        if let Some(entry) = self.entries.get_mut(id) {
            if let Payload::List { elems, len } = &mut entry.payload {
                elems.unlink(&mut self.elems, elem_id);
                *len -= 1;
            }
        }
        if let Some(elem) = self.elems.remove(elem_id) {
            self.arena.release(elem.charged_size());
        }

        if self.list_len(id) == Some(0) {
            debug!("pop: list empty, removing entry");
            self.destroy(id);
        }
        Ok(Some(value))
    }

    /// Element count of the list under `key`; absent or stale keys count
    /// as zero.
    pub(crate) fn llen(&mut self, now: u64, key: &[u8]) -> Result<u32> {
        let hash = hash_key(key);
        self.reclaim_lazy(now);
        match self.find(now, hash, key) {
            Found::Live(id) => match self.entries.get(id).map(|e| &e.payload) {
                Some(Payload::List { len, .. }) => Ok(*len),
                Some(Payload::Scalar { .. }) => Err(Error::TypeMismatch),
                None => Ok(0),
            },
            Found::Stale(_) | Found::Absent => Ok(0),
        }
    }

    fn list_len(&self, id: SlotId) -> Option<u32> {
        match &self.entries.get(id)?.payload {
            Payload::List { len, .. } => Some(*len),
            Payload::Scalar { .. } => None,
        }
    }

    /// Frees all elements of a revived stale list entry and clears its
    /// deadline.
    fn reset_list_entry(&mut self, id: SlotId) {
        let nested = match self.entries.get(id) {
            Some(entry) => match &entry.payload {
                Payload::List { elems, .. } => *elems,
                Payload::Scalar { .. } => return,
            },
            None => return,
        };
        let mut nested = nested;
        while let Some(elem_id) = nested.pop_front(&mut self.elems) {
            if let Some(elem) = self.elems.remove(elem_id) {
                self.arena.release(elem.charged_size());
            }
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.expires_at_ms = 0;
            if let Payload::List { elems, len } = &mut entry.payload {
                *elems = LinkedList::new();
                *len = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{StoreFlags, Value};

    const NOW: u64 = 1_000_000;

    fn core() -> ZoneCore {
        ZoneCore::new(64 * 1024)
    }

    #[test]
    fn fifo_and_lifo_orders() {
        let mut core = core();
        for n in 1..=3 {
            let len = core
                .push(NOW, b"q", ListEnd::Tail, &ListValue::Number(f64::from(n)))
                .unwrap();
            assert_eq!(len, n as u32);
        }

        assert_eq!(
            core.pop(NOW, b"q", ListEnd::Head).unwrap(),
            Some(ListValue::Number(1.0))
        );
        assert_eq!(
            core.pop(NOW, b"q", ListEnd::Tail).unwrap(),
            Some(ListValue::Number(3.0))
        );
        assert_eq!(core.llen(NOW, b"q").unwrap(), 1);
        core.debug_validate_invariants();
    }

    #[test]
    fn popping_last_element_removes_the_entry() {
        let mut core = core();
        core.push(NOW, b"q", ListEnd::Tail, &ListValue::Str(b"only".to_vec()))
            .unwrap();
        assert_eq!(
            core.pop(NOW, b"q", ListEnd::Head).unwrap(),
            Some(ListValue::Str(b"only".to_vec()))
        );
        assert_eq!(core.len(), 0);
        assert_eq!(core.stats().used, 0);
        assert_eq!(core.pop(NOW, b"q", ListEnd::Head).unwrap(), None);
    }

    #[test]
    fn scalar_keys_reject_list_operations() {
        let mut core = core();
        core.store(NOW, b"s", &Value::Bool(true), StoreFlags::default(), 0, 0)
            .unwrap();
        assert_eq!(
            core.push(NOW, b"s", ListEnd::Tail, &ListValue::Number(1.0)),
            Err(Error::TypeMismatch)
        );
        assert_eq!(core.pop(NOW, b"s", ListEnd::Head), Err(Error::TypeMismatch));
        assert_eq!(core.llen(NOW, b"s"), Err(Error::TypeMismatch));
    }

    #[test]
    fn stale_list_entry_is_reset_on_push() {
        let mut core = core();
        core.push(NOW, b"q", ListEnd::Tail, &ListValue::Number(1.0))
            .unwrap();
        core.push(NOW, b"q", ListEnd::Tail, &ListValue::Number(2.0))
            .unwrap();
        core.set_ttl(NOW, b"q", 1).unwrap();
        // keep a live tail so lazy reclaim does not collect "q" first
        core.store(NOW, b"guard", &Value::Bool(true), StoreFlags::default(), 0, 0)
            .unwrap();
        let _ = core.llen(NOW, b"q").unwrap();

        let len = core
            .push(NOW + 10, b"q", ListEnd::Tail, &ListValue::Number(9.0))
            .unwrap();
        assert_eq!(len, 1, "old elements dropped with the stale entry");
        assert_eq!(
            core.pop(NOW + 10, b"q", ListEnd::Head).unwrap(),
            Some(ListValue::Number(9.0))
        );
        core.debug_validate_invariants();
    }

    #[test]
    fn stale_scalar_entry_is_replaced_by_push() {
        let mut core = core();
        core.store(NOW, b"k", &Value::Bool(true), StoreFlags::default(), 1, 0)
            .unwrap();
        core.store(NOW, b"guard", &Value::Bool(true), StoreFlags::default(), 0, 0)
            .unwrap();
        let _ = core.fetch(NOW, b"k", false).unwrap();

        let len = core
            .push(NOW + 10, b"k", ListEnd::Head, &ListValue::Str(b"x".to_vec()))
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(core.llen(NOW + 10, b"k").unwrap(), 1);
        core.debug_validate_invariants();
    }

    #[test]
    fn stale_and_absent_pops_yield_nil() {
        let mut core = core();
        assert_eq!(core.pop(NOW, b"missing", ListEnd::Head).unwrap(), None);
        assert_eq!(core.llen(NOW, b"missing").unwrap(), 0);

        core.push(NOW, b"q", ListEnd::Tail, &ListValue::Number(1.0))
            .unwrap();
        core.set_ttl(NOW, b"q", 1).unwrap();
        core.store(NOW, b"guard", &Value::Bool(true), StoreFlags::default(), 0, 0)
            .unwrap();
        let _ = core.llen(NOW, b"q").unwrap();

        assert_eq!(core.pop(NOW + 10, b"q", ListEnd::Head).unwrap(), None);
        assert_eq!(core.llen(NOW + 10, b"q").unwrap(), 0);
    }

    #[test]
    fn failed_first_push_removes_the_empty_entry() {
        // room for the entry header but never for an element
        let mut core = ZoneCore::new(Entry::list_charge(1) + ListElem::charge(0) - 1);
        let err = core
            .push(NOW, b"q", ListEnd::Tail, &ListValue::Str(b"payload".to_vec()))
            .unwrap_err();
        assert_eq!(err, Error::OutOfMemory);
        assert_eq!(core.len(), 0, "useless empty entry removed");
        assert_eq!(core.stats().used, 0);
    }

    #[test]
    fn failed_push_on_nonempty_list_leaves_it_intact() {
        let mut core = ZoneCore::new(Entry::list_charge(1) + ListElem::charge(8) + 4);
        core.push(NOW, b"q", ListEnd::Tail, &ListValue::Number(1.0))
            .unwrap();
        assert_eq!(
            core.push(NOW, b"q", ListEnd::Tail, &ListValue::Number(2.0)),
            Err(Error::OutOfMemory)
        );
        assert_eq!(core.llen(NOW, b"q").unwrap(), 1);
        assert_eq!(
            core.pop(NOW, b"q", ListEnd::Tail).unwrap(),
            Some(ListValue::Number(1.0))
        );
    }
}
