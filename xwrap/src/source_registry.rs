use crate::SourceCode;

#[derive(Default)]
pub(crate) struct SourceRegistry {
    data: Vec<SourceCode>,
}

impl SourceRegistry {
    /// Returns `None` if source with such ID already registered
    pub(crate) fn register(&mut self, src: SourceCode) -> Option<SourceId> {
        if self.data.iter().any(|x| x.id_of_code == src.id_of_code) {
            return None;
        }
        let id = SourceId(Some(self.data.len()));
        self.data.push(src);
        Some(id)
    }

    pub(crate) fn src(&self, src_id: SourceId) -> &str {
        &self.src_with_id(src_id).code
    }

    pub(crate) fn src_with_id(&self, src_id: SourceId) -> &SourceCode {
        &self.data[src_id.0.expect("Internal Error: Invalid source id")]
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SourceId> {
        (0..self.data.len()).map(|i| SourceId(Some(i)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SourceId(Option<usize>);

impl SourceId {
    #[inline]
    pub(crate) const fn none() -> SourceId {
        SourceId(None)
    }
    #[inline]
    pub(crate) fn is_none(&self) -> bool {
        self.0.is_none()
    }
}
