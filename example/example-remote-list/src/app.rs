use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flowlink_runtime::core::cluster::{load_config, ClusterConfig};
use flowlink_runtime::core::dag::{Dag, DagBuilder};
use flowlink_runtime::core::item::Item;
use flowlink_runtime::core::properties::{Properties, SystemProperties};
use flowlink_runtime::logger::init_log;
use flowlink_runtime::member::Member;
use flowlink_runtime::processors::{map, read_remote_list, write_remote_list};
use flowlink_runtime::runtime::JobCoordinator;
use flowlink_runtime::storage::list::{ItemEvent, TListStore};
use flowlink_runtime::utils::process::{parse_arg, parse_arg_with};
use tokio::sync::watch;

const SOURCE_NAME: &str = "sourceList";
const SINK_NAME: &str = "sinkList";
const JOB_NAME: &str = "ReadWriteRemoteList";
const LISTENER_TIMEOUT: Duration = Duration::from_secs(10);

fn load_cluster_config() -> anyhow::Result<ClusterConfig> {
    let mut cluster_config = match parse_arg("config") {
        Ok(path) => load_config(PathBuf::from(path))?,
        Err(_e) => ClusterConfig::default(),
    };

    if let Ok(port) = parse_arg("port") {
        cluster_config.member.port = port
            .parse()
            .map_err(|e| anyhow!("illegal port `{}`. {}", port, e))?;
    }
    Ok(cluster_config)
}

pub async fn run() -> anyhow::Result<()> {
    let cluster_config = load_cluster_config()?;
    init_log(&cluster_config.log)?;

    let item_count: i64 = parse_arg_with("item_count", "10")
        .parse()
        .map_err(|e| anyhow!("illegal item_count. {}", e))?;

    let member = Member::start(cluster_config.member.clone()).await?;
    let rt = run_job(&member, &cluster_config, item_count).await;
    member.shutdown().await;
    rt
}

async fn run_job(
    member: &Member,
    cluster_config: &ClusterConfig,
    item_count: i64,
) -> anyhow::Result<()> {
    let store = member.store();

    let source = store.create_or_get(SOURCE_NAME).await?;
    store
        .append_all(&source, (0..item_count).map(Item::from).collect())
        .await?;
    info!("`{}` seeded with {} items", SOURCE_NAME, item_count);

    let sink = store.create_or_get(SINK_NAME).await?;
    let (seen_sender, mut seen) = watch::channel(0u64);
    let subscription = store
        .subscribe(
            &sink,
            Arc::new(move |event: ItemEvent| {
                println!("Item added to sink: {}", event.item);
                seen_sender.send_modify(|seen| *seen += 1);
            }),
        )
        .await?;

    let dag = build_dag(member)?;
    let coordinator = JobCoordinator::from_config(cluster_config);
    let mut properties = Properties::new();
    properties.set_job_name(JOB_NAME);

    let job_handle = coordinator.submit_with_properties(dag, properties).await?;
    let outcome = job_handle.join().await;

    if outcome.is_ok() {
        // every append is done, wait for the listener to print them
        let expected = item_count.max(0) as u64;
        let delivered = tokio::time::timeout(
            LISTENER_TIMEOUT,
            seen.wait_for(|seen| *seen >= expected),
        )
        .await
        .map_or(false, |rt| rt.is_ok());
        if !delivered {
            warn!("listener of `{}` behind after {:?}", SINK_NAME, LISTENER_TIMEOUT);
        }
    }
    subscription.unsubscribe().await;

    let summary = outcome?;
    info!("{}", summary);
    Ok(())
}

/// sourceList -> toString -> sinkList, every list accessed through the member protocol
fn build_dag(member: &Member) -> anyhow::Result<Dag> {
    let client_config = member.client_config();

    let mut builder = DagBuilder::new();
    let source = builder.new_vertex(
        "source",
        read_remote_list(client_config.clone(), SOURCE_NAME),
        1,
    );
    let to_string = builder.new_vertex(
        "toString",
        map(|item: Item| Ok(Item::from(item.as_int()?.to_string()))),
        num_cpus::get().clamp(1, u16::MAX as usize) as u16,
    );
    let sink = builder.new_vertex("sink", write_remote_list(client_config, SINK_NAME), 1);
    builder.connect(source, to_string).connect(to_string, sink);

    Ok(builder.build()?)
}
