use indexmap::IndexMap;
use tempfile::TempDir;

use crate::graph_engine::config::Config;
use crate::graph_engine::storage_core::{ADJ_KEY_LEN, Cf, QuiverGraphStorage};
use crate::graph_engine::types::{EngineError, ErrorCode, StorageError};
use crate::props;
use crate::protocol::value::Value;
use crate::utils::id::ElementId;
use crate::utils::items::{AdjEntry, Edge, Inout, Node};

fn setup_test_storage() -> (QuiverGraphStorage, TempDir) {
	let temp_dir = TempDir::new().unwrap();
	let storage =
		QuiverGraphStorage::new(temp_dir.path().to_str().unwrap(), Config::default()).unwrap();
	(storage, temp_dir)
}

fn node(labels: &[&str]) -> Node {
	Node::new(
		ElementId::random(),
		labels.iter().map(|l| l.to_string()).collect(),
		IndexMap::new(),
	)
}

fn edge(src: &Node, dst: &Node, directed: bool, label: &str) -> Edge {
	Edge::new(
		ElementId::random(),
		src.id,
		dst.id,
		directed,
		vec![label.to_string()],
		IndexMap::new(),
	)
}

fn all_adj_entries(txn: &crate::graph_engine::storage_core::GraphTxn) -> Vec<AdjEntry> {
	txn.iterate(Cf::Adj, None, None)
		.map(|item| {
			let (key, value) = item.unwrap();
			let (src, inout, edge) = QuiverGraphStorage::unpack_adj_key(&key).unwrap();
			let dst = QuiverGraphStorage::unpack_adj_value(&value).unwrap();
			AdjEntry {
				src,
				inout,
				edge,
				dst,
			}
		})
		.collect()
}

#[test]
fn test_adj_key_layout() {
	let src = ElementId::from_bytes([1u8; 12]);
	let edge_id = ElementId::from_bytes([2u8; 12]);
	let key = QuiverGraphStorage::adj_key(&src, Inout::In, &edge_id);
	assert_eq!(key.len(), ADJ_KEY_LEN);
	assert_eq!(&key[0..12], src.as_bytes());
	assert_eq!(key[12], 2);
	assert_eq!(&key[13..25], edge_id.as_bytes());

	let (u_src, u_inout, u_edge) = QuiverGraphStorage::unpack_adj_key(&key).unwrap();
	assert_eq!((u_src, u_inout, u_edge), (src, Inout::In, edge_id));

	assert!(QuiverGraphStorage::unpack_adj_key(&key[..24]).is_err());
	let mut bad = key;
	bad[12] = 9;
	assert!(QuiverGraphStorage::unpack_adj_key(&bad).is_err());
}

#[test]
fn test_adj_bounds_select_direction_slices() {
	let id = ElementId::from_bytes([7u8; 12]);
	let (lower, upper) = QuiverGraphStorage::adj_bounds(&id, Inout::Out, Inout::In);
	assert_eq!(&lower[0..12], id.as_bytes());
	assert_eq!(lower[12], 0);
	assert_eq!(upper[12], 3);

	let (lower, upper) = QuiverGraphStorage::adj_bounds(&id, Inout::Simple, Inout::Simple);
	assert_eq!(lower[12], 1);
	assert_eq!(upper[12], 2);
}

#[test]
fn test_insert_then_get_node() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n = Node::new(
		ElementId::random(),
		vec!["Person".to_string()],
		props! { "name" => "ada", "age" => 36i64 },
	);
	txn.put_node(&n).unwrap();

	// visible to the writing transaction itself
	let fetched = txn.get_node(&n.id).unwrap().unwrap();
	assert_eq!(fetched, n);
	let keys: Vec<&str> = fetched.properties.keys().map(String::as_str).collect();
	assert_eq!(keys, ["name", "age"]);

	txn.commit().unwrap();

	let txn = storage.begin();
	assert_eq!(txn.get_node(&n.id).unwrap().unwrap(), n);
	assert!(txn.get_node(&ElementId::random()).unwrap().is_none());
}

#[test]
fn test_put_edge_creates_adjacency_pair() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	txn.put_node(&n1).unwrap();
	txn.put_node(&n2).unwrap();
	let e = edge(&n1, &n2, true, "KNOWS");
	txn.put_edge(&e).unwrap();
	txn.commit().unwrap();

	let txn = storage.begin();
	let out: Vec<AdjEntry> = txn
		.iterate_adj(&n1.id, Inout::Out, Inout::Out)
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(out.len(), 1);
	assert_eq!(out[0].edge, e.id);
	assert_eq!(out[0].dst, n2.id);

	let inward: Vec<AdjEntry> = txn
		.iterate_adj(&n2.id, Inout::In, Inout::In)
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(inward.len(), 1);
	assert_eq!(inward[0].edge, e.id);
	assert_eq!(inward[0].dst, n1.id);

	// no simple entries for a directed edge
	assert_eq!(
		txn.iterate_adj(&n1.id, Inout::Simple, Inout::Simple).count(),
		0
	);
}

#[test]
fn test_put_edge_undirected_writes_simple_entries() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	txn.put_node(&n1).unwrap();
	txn.put_node(&n2).unwrap();
	let e = edge(&n1, &n2, false, "NEAR");
	txn.put_edge(&e).unwrap();

	for endpoint in [&n1, &n2] {
		let entries: Vec<AdjEntry> = txn
			.iterate_adj(&endpoint.id, Inout::Simple, Inout::Simple)
			.map(|r| r.unwrap())
			.collect();
		assert_eq!(entries.len(), 1, "endpoint {} missing entry", endpoint.id);
		assert_eq!(entries[0].edge, e.id);
	}
	assert_eq!(txn.iterate_adj(&n1.id, Inout::Out, Inout::Out).count(), 0);
	assert_eq!(txn.iterate_adj(&n1.id, Inout::In, Inout::In).count(), 0);
}

#[test]
fn test_put_edge_missing_endpoint_is_not_found() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	txn.put_node(&n1).unwrap();
	let ghost = node(&["B"]);
	let e = edge(&n1, &ghost, true, "KNOWS");
	let err = txn.put_edge(&e).unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[test]
fn test_put_edge_mismatch_on_changed_endpoints() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	let n3 = node(&["C"]);
	for n in [&n1, &n2, &n3] {
		txn.put_node(n).unwrap();
	}
	let e = edge(&n1, &n2, true, "KNOWS");
	txn.put_edge(&e).unwrap();

	let mut moved = e.clone();
	moved.dst = n3.id;
	let err = txn.put_edge(&moved).unwrap_err();
	assert!(matches!(
		err,
		EngineError::Storage(StorageError::EdgeDataMismatch { .. })
	));

	let mut flipped = e.clone();
	flipped.directed = false;
	let err = txn.put_edge(&flipped).unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::EdgeDataMismatch));
}

#[test]
fn test_put_edge_same_id_refreshes_without_duplicating_index() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	txn.put_node(&n1).unwrap();
	txn.put_node(&n2).unwrap();
	let mut e = edge(&n1, &n2, true, "KNOWS");
	txn.put_edge(&e).unwrap();

	e.properties
		.insert("since".to_string(), Value::I64(2021));
	txn.put_edge(&e).unwrap();

	assert_eq!(all_adj_entries(&txn).len(), 2);
	let fetched = txn.get_edge(&e.id).unwrap().unwrap();
	assert_eq!(fetched.get_property("since"), Some(&Value::I64(2021)));
}

#[test]
fn test_delete_edge_removes_both_entries() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	txn.put_node(&n1).unwrap();
	txn.put_node(&n2).unwrap();
	let e = edge(&n1, &n2, true, "KNOWS");
	txn.put_edge(&e).unwrap();
	txn.commit().unwrap();

	let txn = storage.begin();
	txn.delete_edge(&e.id).unwrap();
	assert!(txn.get_edge(&e.id).unwrap().is_none());
	assert_eq!(all_adj_entries(&txn).len(), 0);

	// deleting again fails NotFound
	let err = txn.delete_edge(&e.id).unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[test]
fn test_delete_node_removes_index_but_not_edge_rows() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	let n3 = node(&["C"]);
	for n in [&n1, &n2, &n3] {
		txn.put_node(n).unwrap();
	}
	let e1 = edge(&n1, &n2, false, "NEAR");
	let e2 = edge(&n2, &n3, false, "NEAR");
	txn.put_edge(&e1).unwrap();
	txn.put_edge(&e2).unwrap();
	txn.commit().unwrap();

	let txn = storage.begin();
	txn.delete_node(&n2.id).unwrap();

	assert!(txn.get_node(&n2.id).unwrap().is_none());
	// no adjacency survives on either side of the deleted node
	assert_eq!(all_adj_entries(&txn).len(), 0);
	// edge rows dangle until explicitly deleted
	assert!(txn.get_edge(&e1.id).unwrap().is_some());
	assert!(txn.get_edge(&e2.id).unwrap().is_some());

	let err = txn.delete_node(&n2.id).unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[test]
fn test_self_loop_directed_produces_two_entries() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let n = node(&["A"]);
	txn.put_node(&n).unwrap();
	let e = Edge::new(
		ElementId::random(),
		n.id,
		n.id,
		true,
		vec!["SELF".to_string()],
		IndexMap::new(),
	);
	txn.put_edge(&e).unwrap();

	let entries = all_adj_entries(&txn);
	assert_eq!(entries.len(), 2);
	assert!(entries.iter().any(|entry| entry.inout == Inout::Out));
	assert!(entries.iter().any(|entry| entry.inout == Inout::In));
	for entry in &entries {
		assert_eq!(entry.src, n.id);
		assert_eq!(entry.dst, n.id);
	}

	txn.delete_node(&n.id).unwrap();
	assert_eq!(all_adj_entries(&txn).len(), 0);
}

#[test]
fn test_adjacency_symmetry() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let nodes: Vec<Node> = (0..4).map(|_| node(&["N"])).collect();
	for n in &nodes {
		txn.put_node(n).unwrap();
	}
	txn.put_edge(&edge(&nodes[0], &nodes[1], true, "E")).unwrap();
	txn.put_edge(&edge(&nodes[1], &nodes[2], false, "E")).unwrap();
	txn.put_edge(&edge(&nodes[2], &nodes[3], true, "E")).unwrap();
	txn.put_edge(&edge(&nodes[3], &nodes[0], false, "E")).unwrap();
	txn.commit().unwrap();

	let txn = storage.begin();
	let entries = all_adj_entries(&txn);
	assert_eq!(entries.len(), 8);
	for entry in &entries {
		assert!(
			entries.contains(&entry.reverse()),
			"missing reverse of {entry:?}"
		);
		// soundness: the referenced edge exists with matching endpoints
		let e = txn.get_edge(&entry.edge).unwrap().unwrap();
		match entry.inout {
			Inout::Out => assert!((e.src, e.dst) == (entry.src, entry.dst) && e.directed),
			Inout::In => assert!((e.src, e.dst) == (entry.dst, entry.src) && e.directed),
			Inout::Simple => {
				assert!(!e.directed);
				assert!(
					(e.src, e.dst) == (entry.src, entry.dst)
						|| (e.src, e.dst) == (entry.dst, entry.src)
				);
			}
		}
	}
}

#[test]
fn test_direction_slice_bounds_are_respected() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let hub = node(&["Hub"]);
	let a = node(&["A"]);
	let b = node(&["B"]);
	let c = node(&["C"]);
	for n in [&hub, &a, &b, &c] {
		txn.put_node(n).unwrap();
	}
	// out edge, in edge, and an undirected edge on the same hub
	txn.put_edge(&edge(&hub, &a, true, "E")).unwrap();
	txn.put_edge(&edge(&b, &hub, true, "E")).unwrap();
	txn.put_edge(&edge(&hub, &c, false, "E")).unwrap();

	let count = |min, max| txn.iterate_adj(&hub.id, min, max).count();
	assert_eq!(count(Inout::Out, Inout::Out), 1);
	assert_eq!(count(Inout::Simple, Inout::Simple), 1);
	assert_eq!(count(Inout::In, Inout::In), 1);
	assert_eq!(count(Inout::Out, Inout::Simple), 2);
	assert_eq!(count(Inout::Simple, Inout::In), 2);
	assert_eq!(count(Inout::Out, Inout::In), 3);
}

#[test]
fn test_snapshot_isolation_busy() {
	let (storage, _temp_dir) = setup_test_storage();

	let tx1 = storage.begin();
	let tx2 = storage.begin();

	tx1.put(Cf::Default, b"x", b"1").unwrap();
	tx1.commit().unwrap();

	// tx2 still reads its start snapshot
	assert_eq!(tx2.get(Cf::Default, b"x").unwrap(), None);

	// and its conflicting write fails at commit
	tx2.put(Cf::Default, b"x", b"2").unwrap();
	let err = tx2.commit().unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::Busy));
	assert!(err.is_retryable());

	// retry with a fresh transaction succeeds
	let tx3 = storage.begin();
	tx3.put(Cf::Default, b"x", b"2").unwrap();
	tx3.commit().unwrap();
}

#[test]
fn test_commit_visibility() {
	let (storage, _temp_dir) = setup_test_storage();

	let n = node(&["Person"]);
	let writer = storage.begin();
	let concurrent = storage.begin();

	writer.put_node(&n).unwrap();
	// invisible to a concurrently-open transaction, before and after commit
	assert!(concurrent.get_node(&n.id).unwrap().is_none());
	writer.commit().unwrap();
	assert!(concurrent.get_node(&n.id).unwrap().is_none());

	let after = storage.begin();
	assert!(after.get_node(&n.id).unwrap().is_some());
}

#[test]
fn test_adjacency_read_under_concurrent_delete() {
	let (storage, _temp_dir) = setup_test_storage();
	let setup = storage.begin();
	let n1 = node(&["A"]);
	let n2 = node(&["B"]);
	let n3 = node(&["C"]);
	for n in [&n1, &n2, &n3] {
		setup.put_node(n).unwrap();
	}
	let e1 = edge(&n1, &n2, false, "E");
	let e2 = edge(&n2, &n3, false, "E");
	setup.put_edge(&e1).unwrap();
	setup.put_edge(&e2).unwrap();
	setup.commit().unwrap();

	let tx1 = storage.begin();
	let tx2 = storage.begin();

	tx1.delete_node(&n2.id).unwrap();
	tx1.commit().unwrap();

	// tx2 reads its snapshot: n1's adjacency still shows e1
	let entries: Vec<AdjEntry> = tx2
		.iterate_adj(&n1.id, Inout::Simple, Inout::Simple)
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].edge, e1.id);

	// non-conflict reads do not poison the commit
	tx2.put(Cf::Default, b"marker", b"1").unwrap();
	tx2.commit().unwrap();

	// but a read-for-update of a key tx1 wrote does
	let tx3 = storage.begin();
	let tx4 = storage.begin();
	tx3.put(Cf::Default, b"contended", b"1").unwrap();
	tx3.commit().unwrap();
	tx4.get_for_update(Cf::Default, b"contended").unwrap();
	tx4.put(Cf::Default, b"other", b"1").unwrap();
	let err = tx4.commit().unwrap_err();
	assert_eq!(err.code(), Some(ErrorCode::Busy));
}

#[test]
fn test_delete_range() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	for key in [b"a1", b"a2", b"a3", b"b1"] {
		txn.put(Cf::Default, key, b"v").unwrap();
	}
	let removed = txn.delete_range(Cf::Default, b"a1", b"a3").unwrap();
	assert_eq!(removed, 2);
	assert!(txn.get(Cf::Default, b"a1").unwrap().is_none());
	assert!(txn.get(Cf::Default, b"a2").unwrap().is_none());
	assert!(txn.get(Cf::Default, b"a3").unwrap().is_some());
	assert!(txn.get(Cf::Default, b"b1").unwrap().is_some());
}

#[test]
fn test_savepoint_rollback() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	txn.put(Cf::Default, b"kept", b"1").unwrap();
	txn.set_savepoint();
	txn.put(Cf::Default, b"discarded", b"1").unwrap();
	txn.rollback_to_savepoint().unwrap();

	assert!(txn.get(Cf::Default, b"kept").unwrap().is_some());
	assert!(txn.get(Cf::Default, b"discarded").unwrap().is_none());
	txn.commit().unwrap();
}

#[test]
fn test_rollback_discards_writes() {
	let (storage, _temp_dir) = setup_test_storage();
	let n = node(&["Person"]);

	let txn = storage.begin();
	txn.put_node(&n).unwrap();
	txn.rollback().unwrap();

	let txn = storage.begin();
	assert!(txn.get_node(&n.id).unwrap().is_none());
}

#[test]
fn test_iterate_nodes_in_id_order() {
	let (storage, _temp_dir) = setup_test_storage();
	let txn = storage.begin();

	let mut nodes: Vec<Node> = (0..8).map(|_| node(&["N"])).collect();
	for n in &nodes {
		txn.put_node(n).unwrap();
	}
	nodes.sort_by_key(|n| n.id);

	let scanned: Vec<ElementId> = txn.iterate_nodes().map(|r| r.unwrap().0).collect();
	let expected: Vec<ElementId> = nodes.iter().map(|n| n.id).collect();
	assert_eq!(scanned, expected);
}
