use replica_store::ReplicaStore;

/// The relational and document replicas, addressed together.
///
/// Relational is the canonical side: it assigns identifiers and is written
/// first. Document follows with the same identifiers.
#[derive(Clone)]
pub struct Replicas<R, D> {
    pub relational: R,
    pub document: D,
}

impl<R, D> Replicas<R, D>
where
    R: ReplicaStore,
    D: ReplicaStore,
{
    pub fn new(relational: R, document: D) -> Self {
        Self {
            relational,
            document,
        }
    }
}
