//! Layer selection for replica requests.

use restgis_core::{layer_name_matches, FeatureService, RestTransport};

/// One entry of a layer selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerRef {
    /// Numeric layer id.
    Id(i64),
    /// Layer name, matched case-insensitively.
    Name(String),
}

impl LayerRef {
    /// Reads numeric text as an id and anything else as a name.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        text.parse()
            .map(Self::Id)
            .unwrap_or_else(|_| Self::Name(text.to_string()))
    }
}

/// Layers to include in a replica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerSelector {
    layers: Vec<LayerRef>,
}

impl LayerSelector {
    /// Creates a selector from entries.
    pub fn new(layers: Vec<LayerRef>) -> Self {
        Self { layers }
    }

    /// Parses comma-delimited ids or names.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(LayerRef::parse)
                .collect(),
        )
    }

    /// Selected entries.
    pub fn layers(&self) -> &[LayerRef] {
        &self.layers
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Resolves the selection to layer ids of `service`.
    ///
    /// Ids pass through in the given order. Names match layers and tables
    /// case-insensitively, with `*` as a wildcard, in both paths. A selection
    /// made only of names resolves in the service's layer order; a mixed
    /// selection keeps the caller's order and takes the first match per
    /// name. Names that match no layer are dropped with a warning; callers
    /// that care must check the count.
    pub fn resolve<T: RestTransport>(&self, service: &FeatureService<T>) -> Vec<i64> {
        let names: Vec<&str> = self
            .layers
            .iter()
            .filter_map(|l| match l {
                LayerRef::Name(name) => Some(name.as_str()),
                LayerRef::Id(_) => None,
            })
            .collect();
        let info = service.info();
        for name in &names {
            let found = info
                .layers
                .iter()
                .chain(info.tables.iter())
                .any(|l| layer_name_matches(name, &l.name));
            if !found {
                tracing::warn!(
                    layer = %name,
                    service = %service.url(),
                    "replica layer not found, skipping"
                );
            }
        }

        if !names.is_empty() && names.len() == self.layers.len() {
            return info
                .layers
                .iter()
                .chain(info.tables.iter())
                .filter(|l| names.iter().any(|name| layer_name_matches(name, &l.name)))
                .map(|l| l.id)
                .collect();
        }

        self.layers
            .iter()
            .filter_map(|l| match l {
                LayerRef::Id(id) => Some(*id),
                LayerRef::Name(name) => service.layer_id(name),
            })
            .collect()
    }
}

/// Joins resolved ids for the `layers` parameter.
pub fn join_layer_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

impl From<&str> for LayerSelector {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for LayerSelector {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<i64> for LayerSelector {
    fn from(id: i64) -> Self {
        Self::new(vec![LayerRef::Id(id)])
    }
}

impl From<Vec<i64>> for LayerSelector {
    fn from(ids: Vec<i64>) -> Self {
        Self::new(ids.into_iter().map(LayerRef::Id).collect())
    }
}

impl From<&[i64]> for LayerSelector {
    fn from(ids: &[i64]) -> Self {
        Self::new(ids.iter().copied().map(LayerRef::Id).collect())
    }
}

impl From<Vec<&str>> for LayerSelector {
    fn from(names: Vec<&str>) -> Self {
        Self::new(names.into_iter().map(LayerRef::parse).collect())
    }
}

impl From<Vec<String>> for LayerSelector {
    fn from(names: Vec<String>) -> Self {
        Self::new(names.iter().map(|n| LayerRef::parse(n)).collect())
    }
}

impl From<Vec<LayerRef>> for LayerSelector {
    fn from(layers: Vec<LayerRef>) -> Self {
        Self::new(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgis_core::{LayerSummary, MockTransport, ServiceInfo};
    use std::sync::Arc;

    fn service() -> FeatureService<MockTransport> {
        let info = ServiceInfo {
            layers: vec![
                LayerSummary {
                    id: 0,
                    name: "Hydrants".into(),
                },
                LayerSummary {
                    id: 1,
                    name: "Valves".into(),
                },
                LayerSummary {
                    id: 2,
                    name: "Mains".into(),
                },
            ],
            ..ServiceInfo::default()
        };
        FeatureService::from_info(
            "https://h/FeatureServer",
            Arc::new(MockTransport::new()),
            info,
        )
    }

    #[test]
    fn parse_splits_ids_and_names() {
        assert_eq!(
            LayerSelector::parse(" 0, 2 ,Mains,").layers(),
            &[LayerRef::Id(0), LayerRef::Id(2), LayerRef::Name("Mains".into())]
        );
        assert!(LayerSelector::parse("").is_empty());
    }

    #[test]
    fn ids_pass_through() {
        let service = service();
        assert_eq!(LayerSelector::from(vec![2, 0]).resolve(&service), vec![2, 0]);
        assert_eq!(LayerSelector::from(7).resolve(&service), vec![7]);
        assert_eq!(join_layer_ids(&[2, 0]), "2,0");
    }

    #[test]
    fn names_resolve_in_service_order_and_drop_unknowns() {
        let service = service();
        let ids = LayerSelector::from("mains, HYDRANTS, Pumps").resolve(&service);
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn mixed_selection_resolves_element_wise() {
        let service = service();
        let ids = LayerSelector::from(vec!["valves", "0", "Pumps"]).resolve(&service);
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn wildcards_match_the_same_in_both_paths() {
        let service = service();
        assert_eq!(
            LayerSelector::from("*ants, m*").resolve(&service),
            vec![0, 2]
        );
        assert_eq!(
            LayerSelector::from(vec!["m*", "1", "*ants"]).resolve(&service),
            vec![2, 1, 0]
        );
    }
}
