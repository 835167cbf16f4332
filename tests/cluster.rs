use anyhow::Result;
use bytes::Bytes;
use mrshuffle::config::NodeConfig;
use mrshuffle::divider::DividerList;
use mrshuffle::node::{MapNode, MapStats, ReduceNode, ReduceStats};
use mrshuffle::topology::local::LocalCluster;
use mrshuffle::topology::tcp::{ClusterSpec, TcpTopology};
use mrshuffle::topology::{NodeAddr, NodeRole};
use mrshuffle::*;
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;

/// Parses `key value` lines; the hash is the key's first byte.
fn map_pairs(data: &[u8], last: bool, out: &mut ItemStore, _: &Bytes) -> Result<usize> {
    let mut cursor = 0;
    for line in data.split_inclusive(|&b| b == b'\n') {
        if !last && !line.ends_with(b"\n") {
            break;
        }
        cursor += line.len();
        let text = String::from_utf8_lossy(line);
        let mut fields = text.split_whitespace();
        if let (Some(key), Some(value)) = (fields.next(), fields.next()) {
            let key = Bytes::copy_from_slice(key.as_bytes());
            out.push(Item::with_inline(key.slice(..1), key, value.parse()?))?;
        }
    }
    Ok(cursor)
}

fn sum_pairs(input: ItemStore, out: &mut ItemStore, _: &Bytes) -> Result<()> {
    let mut acc: Option<Item> = None;
    for item in input {
        if let Some(a) = acc.as_mut() {
            if a.key == item.key {
                let total = a.value.inline().unwrap_or(0) + item.value.inline().unwrap_or(0);
                a.value = ItemValue::Inline(total);
                continue;
            }
        }
        if let Some(done) = acc.replace(item) {
            out.push(done)?;
        }
    }
    if let Some(done) = acc {
        out.push(done)?;
    }
    Ok(())
}

fn print_pairs(items: &ItemStore, out: &mut dyn Write, _: &Bytes) -> Result<()> {
    for item in items {
        writeln!(
            out,
            "{}:{}",
            String::from_utf8_lossy(&item.key),
            item.value.inline().unwrap_or(0)
        )?;
    }
    Ok(())
}

fn pairs() -> Workload {
    Workload {
        map_fn: map_pairs,
        combine_fn: Some(sum_pairs),
        reduce_fn: print_pairs,
        hash_cmp: default_hash_cmp,
        hash_fmt: default_hash_fmt,
        layout: Layout::new(1, true),
    }
}

struct Run {
    maps: Vec<MapStats>,
    reduces: Vec<(ReduceStats, String)>,
}

fn run_local(
    workload: Workload,
    inputs: Vec<&str>,
    reducers: usize,
    chunk_size: usize,
    dividers: Option<DividerList>,
) -> Run {
    let config = NodeConfig::new(workload.layout)
        .unwrap()
        .with_chunk_size(chunk_size)
        .unwrap();
    let cluster = LocalCluster::from_bytes(
        inputs.into_iter().map(|s| Bytes::from(s.to_string())).collect(),
        reducers,
    );

    let maps: Vec<_> = cluster
        .maps
        .into_iter()
        .map(|mut topology| {
            let mut node = MapNode::new(workload, config);
            if let Some(list) = dividers.clone() {
                node = node.with_dividers(list);
            }
            thread::spawn(move || node.run(&mut topology).unwrap())
        })
        .collect();
    let reduces: Vec<_> = cluster
        .reduces
        .into_iter()
        .map(|mut topology| {
            thread::spawn(move || {
                let mut out = Vec::new();
                let stats = ReduceNode::new(workload, config)
                    .run(&mut topology, &mut out)
                    .unwrap();
                (stats, String::from_utf8(out).unwrap())
            })
        })
        .collect();

    Run {
        maps: maps.into_iter().map(|h| h.join().unwrap()).collect(),
        reduces: reduces.into_iter().map(|h| h.join().unwrap()).collect(),
    }
}

#[test]
fn ranges_reach_the_reducer_owning_them() {
    let dividers =
        DividerList::new(vec![Bytes::from_static(b"b"), max_hash(1)], 1, default_hash_cmp).unwrap();
    let run = run_local(pairs(), vec!["a 1\nb 2\n", "b 3\nc 4\n"], 2, 64, Some(dividers));
    assert_eq!(run.reduces[0].1, "a:1\nb:5\n");
    assert_eq!(run.reduces[1].1, "c:4\n");
}

#[test]
fn empty_inputs_still_terminate_every_reducer() {
    let run = run_local(pairs(), vec!["", ""], 3, 64, None);
    for map in &run.maps {
        assert_eq!(map.chunks, 1);
        assert_eq!(map.items_sent, 0);
    }
    for (stats, out) in &run.reduces {
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.items, 0);
        assert!(out.is_empty());
    }
}

#[test]
fn reducers_run_one_round_per_chunk_of_the_longest_input() {
    let long = "a 1\nb 1\nc 1\nd 1\ne 1\nf 1\ng 1\nh 1\n";
    let run = run_local(pairs(), vec![long, "a 1\n", ""], 2, 8, None);
    let most = run.maps.iter().map(|m| m.chunks).max().unwrap();
    // a full last chunk is followed by an empty terminal one
    assert_eq!(run.maps[0].chunks, 5);
    assert_eq!(most, 5);
    for (stats, _) in &run.reduces {
        assert_eq!(stats.rounds, most);
    }
    let total: u64 = run
        .reduces
        .iter()
        .flat_map(|(_, out)| out.lines().map(|l| l.rsplit(':').next().unwrap().to_string()))
        .map(|count| count.parse::<u64>().unwrap())
        .sum();
    assert_eq!(total, 9);
}

#[test]
fn record_longer_than_a_chunk_fails_the_map_node() {
    let cases = [
        ("wc", "abcdefghijk zz\n", vec![]),
        ("grep", "a long matching line\nz\n", vec!["--term", "line"]),
    ];
    for (name, input, args) in cases {
        let engine = workload::named(name).unwrap();
        let config = NodeConfig::new(engine.layout).unwrap().with_chunk_size(8).unwrap();
        let args: Vec<String> = args.into_iter().map(str::to_string).collect();
        let aux = utils::serialize_args(&args).unwrap();
        let mut cluster = LocalCluster::from_bytes(vec![Bytes::from(input)], 1);

        // pipes never block, so the map node runs alone on this thread
        let err = MapNode::new(engine, config)
            .with_aux(aux)
            .run(&mut cluster.maps[0])
            .unwrap_err();
        assert!(err.to_string().contains("consumed nothing"), "{}: {}", name, err);
    }
}

#[test]
fn planned_dividers_split_word_count_into_disjoint_ranges() {
    let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu\n";
    let inputs = vec![text, text, "alpha alpha beta\n"];
    let run = run_local(workload::named("wc").unwrap(), inputs, 4, 16, None);

    let mut seen = Vec::new();
    for (_, out) in &run.reduces {
        for line in out.lines() {
            let (word, count) = line.split_once(' ').unwrap();
            seen.push((word.to_string(), count.parse::<u64>().unwrap()));
        }
    }
    seen.sort();
    // every word lands on exactly one reducer
    let mut words: Vec<_> = seen.iter().map(|(w, _)| w.clone()).collect();
    words.dedup();
    assert_eq!(words.len(), seen.len());
    assert_eq!(seen.len(), 12);
    assert!(seen.contains(&("alpha".to_string(), 4)));
    assert!(seen.contains(&("beta".to_string(), 3)));
    assert!(seen.contains(&("mu".to_string(), 2)));
}

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

#[test]
fn word_count_over_tcp() {
    let cluster = ClusterSpec {
        map: vec![free_addr(), free_addr()],
        reduce: vec![free_addr(), free_addr()],
    };
    let wc = workload::named("wc").unwrap();
    let config = NodeConfig::new(wc.layout).unwrap().with_chunk_size(32).unwrap();
    let inputs = ["red green blue red\nblue red\n", "green red yellow\n"];

    let mut handles = Vec::new();
    for r in 0..2 {
        let cluster = cluster.clone();
        handles.push(thread::spawn(move || {
            let mut topology =
                TcpTopology::bind(cluster, NodeAddr::new(NodeRole::Reduce, r), None).unwrap();
            let mut out = Vec::new();
            ReduceNode::new(wc, config).run(&mut topology, &mut out).unwrap();
            String::from_utf8(out).unwrap()
        }));
    }
    for (m, input) in inputs.iter().enumerate() {
        let cluster = cluster.clone();
        let input: Box<dyn Read + Send> = Box::new(Cursor::new(input.as_bytes().to_vec()));
        handles.push(thread::spawn(move || {
            let mut topology =
                TcpTopology::bind(cluster, NodeAddr::new(NodeRole::Map, m), Some(input)).unwrap();
            MapNode::new(wc, config).run(&mut topology).unwrap();
            String::new()
        }));
    }

    let mut lines: Vec<String> = handles
        .into_iter()
        .flat_map(|h| {
            let out = h.join().unwrap();
            out.lines().map(str::to_string).collect::<Vec<_>>()
        })
        .collect();
    lines.sort();
    assert_eq!(lines, vec!["blue 2", "green 2", "red 4", "yellow 1"]);
}
