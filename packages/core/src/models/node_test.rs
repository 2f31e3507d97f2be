//! Tests for Node, Tag and value models

#[cfg(test)]
mod tests {
    use crate::models::{
        ConfigPv, Node, NodeType, PvData, PvValue, SnapshotItem, Tag, ROOT_NODE_UNIQUE_ID,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_node_type_round_trips_through_strings() {
        for node_type in [NodeType::Folder, NodeType::Configuration, NodeType::Snapshot] {
            let parsed: NodeType = node_type.as_str().parse().unwrap();
            assert_eq!(parsed, node_type);
        }
        assert!("folder".parse::<NodeType>().is_err());
        assert!("PV".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_put_empty_property_removes_key() {
        let mut node = Node::folder("Folder").with_property("a", "b");
        assert_eq!(node.get_property("a"), Some("b"));

        node.put_property("a", "");
        assert_eq!(node.get_property("a"), None);
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_set_properties_drops_empty_entries() {
        let mut props = BTreeMap::new();
        props.insert("a".to_string(), "b".to_string());
        props.insert("empty".to_string(), String::new());
        props.insert(String::new(), "c".to_string());

        let node = Node::folder("Folder").with_properties(props);
        assert_eq!(node.properties.len(), 1);
        assert_eq!(node.get_property("a"), Some("b"));
    }

    #[test]
    fn test_deserialize_drops_null_properties() {
        let value = json!({
            "name": "Folder",
            "nodeType": "FOLDER",
            "created": "2024-01-01T00:00:00Z",
            "lastModified": "2024-01-01T00:00:00Z",
            "properties": { "a": null, "b": "", "c": "d" }
        });
        let node: Node = serde_json::from_value(value).unwrap();
        assert_eq!(node.properties.len(), 1);
        assert_eq!(node.get_property("c"), Some("d"));
        assert_eq!(node.id, 0);
        assert!(node.tags.is_empty());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        assert!(Node::folder("   ").validate().is_err());
        assert!(Node::folder("ok").validate().is_ok());
    }

    #[test]
    fn test_is_root_uses_fixed_unique_id() {
        let mut node = Node::folder("Anything");
        assert!(!node.is_root());
        node.unique_id = ROOT_NODE_UNIQUE_ID.to_string();
        assert!(node.is_root());
    }

    #[test]
    fn test_add_tag_keeps_first_of_same_name() {
        let mut snapshot = Node::new("snap", NodeType::Snapshot);
        assert!(snapshot.add_tag(Tag::new("golden").with_comment("first")));
        assert!(!snapshot.add_tag(Tag::new("golden").with_comment("second")));

        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].comment.as_deref(), Some("first"));
        assert_eq!(snapshot.tags[0].snapshot_id, snapshot.unique_id);
    }

    #[test]
    fn test_add_tag_ignored_on_non_snapshot() {
        let mut folder = Node::folder("Folder");
        assert!(!folder.add_tag(Tag::new("golden")));
        assert!(folder.tags.is_empty());
    }

    #[test]
    fn test_remove_tag_matches_by_name() {
        let mut snapshot = Node::new("snap", NodeType::Snapshot);
        snapshot.add_tag(Tag::new("a"));
        snapshot.add_tag(Tag::new("b"));

        assert!(snapshot.remove_tag(&Tag::new("a").with_comment("different")));
        assert!(!snapshot.remove_tag(&Tag::new("missing")));
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].name, "b");
    }

    #[test]
    fn test_config_pv_empty_readback_is_absent() {
        let pv = ConfigPv::new("SR:C01:current").with_readback("");
        assert_eq!(pv.readback_pv_name, None);
        assert_eq!(pv.readback_or_empty(), "");
        assert!(ConfigPv::new(" ").validate().is_err());
    }

    #[test]
    fn test_pv_value_json_shape() {
        let value = PvValue::double(7.7);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["data"]["type"], "double");
        assert_eq!(json["data"]["value"], 7.7);

        let decoded: PvValue = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.as_f64(), Some(7.7));
    }

    #[test]
    fn test_enum_value_numeric_view() {
        let value = PvValue::new(PvData::Enum {
            index: 2,
            labels: vec!["Off".into(), "Standby".into(), "On".into()],
        });
        assert_eq!(value.as_f64(), Some(2.0));
        assert_eq!(PvValue::string("text").as_f64(), None);
    }

    #[test]
    fn test_snapshot_item_has_data() {
        let pv = ConfigPv::new("pv");
        assert!(!SnapshotItem::new(pv.clone()).has_data());
        assert!(SnapshotItem::new(pv.clone()).with_value(PvValue::int(7)).has_data());
        assert!(SnapshotItem::new(pv).with_readback_value(PvValue::int(7)).has_data());
    }
}
