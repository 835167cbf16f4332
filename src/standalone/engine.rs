use anyhow::{anyhow, bail, ensure, Result};
use bytes::{BufMut, Bytes, BytesMut};
use glob::glob;
use std::{
    fs::{self, File},
    io::{BufWriter, Read},
    thread,
};
use tracing::info;

use crate::config::NodeConfig;
use crate::node::{MapNode, MapStats, ReduceNode, ReduceStats};
use crate::standalone::Job;
use crate::topology::local::LocalCluster;
use crate::utils::serialize_args;
use crate::Workload;

/// Counters of every node of a standalone run.
#[derive(Debug, Default)]
pub struct JobStats {
    pub maps: Vec<MapStats>,
    pub reduces: Vec<ReduceStats>,
}

/// Reads the job's input files and deals them out to `mappers` map inputs,
/// round robin in path order.
pub fn load_inputs(job: &Job) -> Result<Vec<Bytes>> {
    let mut paths = glob(&job.input)?.flatten().collect::<Vec<_>>();
    paths.sort();
    if paths.is_empty() {
        bail!("No input files match `{}`", job.input);
    }
    let mappers = job.mappers.unwrap_or(paths.len());
    ensure!(mappers > 0, "At least one map node is required");

    let mut inputs = vec![BytesMut::new(); mappers];
    for (i, pathspec) in paths.iter().enumerate() {
        let mut buf = Vec::new();
        {
            // a scope so that the file is closed right after reading
            let mut file = File::open(pathspec)?;
            file.read_to_end(&mut buf)?;
        }
        let input = &mut inputs[i % mappers];
        input.put_slice(&buf);
        // files must not run into each other
        if !buf.is_empty() && !buf.ends_with(b"\n") {
            input.put_u8(b'\n');
        }
    }
    Ok(inputs.into_iter().map(BytesMut::freeze).collect())
}

/// Runs `job` on an in-process cluster, one thread per node, and writes
/// reduce node `r`'s output to `<output>/mr-out-<r>`.
pub fn run_job(job: &Job, engine: Workload) -> Result<JobStats> {
    ensure!(job.reducers > 0, "At least one reduce node is required");
    let config = NodeConfig::from_env(engine.layout)?;
    let aux = serialize_args(&job.args)?;
    let inputs = load_inputs(job)?;
    fs::create_dir_all(&job.output)?;
    info!(maps = inputs.len(), reduces = job.reducers, workload = %job.workload, "starting job");

    let cluster = LocalCluster::from_bytes(inputs, job.reducers);

    let map_handles: Vec<_> = cluster
        .maps
        .into_iter()
        .map(|mut topology| {
            let node = MapNode::new(engine, config).with_aux(aux.clone());
            thread::spawn(move || {
                let mut node = node;
                node.run(&mut topology)
            })
        })
        .collect();

    let mut reduce_handles = Vec::with_capacity(job.reducers);
    for (reduce_id, mut topology) in cluster.reduces.into_iter().enumerate() {
        let out_pathspec = format!("{}/mr-out-{}", &job.output, reduce_id);
        let mut out_file = BufWriter::new(File::create(&out_pathspec)?);
        let mut node = ReduceNode::new(engine, config).with_aux(aux.clone());
        reduce_handles.push(thread::spawn(move || node.run(&mut topology, &mut out_file)));
    }

    // join everything before reporting, so no thread outlives a failure
    let maps: Vec<_> = map_handles.into_iter().map(join).collect();
    let reduces: Vec<_> = reduce_handles.into_iter().map(join).collect();
    let stats = JobStats {
        maps: maps.into_iter().collect::<Result<_>>()?,
        reduces: reduces.into_iter().collect::<Result<_>>()?,
    };
    info!(
        chunks = stats.maps.iter().map(|s| s.chunks).sum::<usize>(),
        items = stats.reduces.iter().map(|s| s.items).sum::<usize>(),
        "job done"
    );
    Ok(stats)
}

fn join<T>(handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    handle.join().map_err(|_| anyhow!("Node thread panicked"))?
}
