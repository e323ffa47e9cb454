pub mod index;
pub mod linked;
pub mod slots;

pub use index::{OrderedIndex, TreeLinks, TreeNode};
pub use linked::{Linked, LinkedList, Links};
pub use slots::{SlotId, SlotPool};
