use std::{
    net::UdpSocket,
    sync::Arc,
    time::Duration,
};

use spectator::{PercentileTimer, Registry};
use spectator_exporter::{protocol::parse_line, ExporterBuilder};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn receive_lines(server: &UdpSocket) -> Vec<String> {
    let mut buf = [0u8; 8192];
    let mut lines = Vec::new();
    while let Ok(len) = server.recv(&mut buf) {
        let payload = std::str::from_utf8(&buf[..len]).unwrap();
        lines.extend(payload.lines().map(str::to_string));
    }
    lines
}

#[test]
fn stop_flushes_to_udp_agent() {
    init_tracing();

    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let location = format!("udp://{}", server.local_addr().unwrap());

    let registry = Arc::new(Registry::default());
    let exporter = ExporterBuilder::default()
        .with_env_override(false)
        .with_location(location)
        .unwrap()
        .with_flush_interval(Duration::from_secs(3600))
        .spawn(Arc::clone(&registry))
        .unwrap();

    registry.counter("server.requests", [("status", "200")]).add(2);
    registry.max_gauge("server.queue", Vec::<(String, String)>::new()).update(12.0);
    exporter.stop();

    let mut lines = receive_lines(&server);
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "c:server.requests,statistic=count,status=200:2".to_string(),
            "m:server.queue,statistic=max:12".to_string(),
        ]
    );
}

#[test]
fn periodic_flush_publishes_percentiles() {
    init_tracing();

    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let location = format!("udp://{}", server.local_addr().unwrap());

    let registry = Arc::new(Registry::default());
    let timer = PercentileTimer::builder(&registry).with_name("latency").build().unwrap();
    timer.record(Duration::from_millis(50));
    timer.record(Duration::from_millis(50));

    let exporter = ExporterBuilder::default()
        .with_env_override(false)
        .with_location(location)
        .unwrap()
        .with_flush_interval(Duration::from_millis(50))
        .spawn(Arc::clone(&registry))
        .unwrap();

    let lines = receive_lines(&server);
    drop(exporter);

    let parsed: Vec<_> = lines.iter().map(|line| parse_line(line).unwrap()).collect();
    let percentile = parsed
        .iter()
        .find(|(_, id, _)| id.tag("statistic") == Some("percentile"))
        .expect("percentile counter published");
    assert_eq!(percentile.0, "c");
    assert_eq!(percentile.1.name(), "latency");
    assert!(percentile.1.tag("percentile").unwrap().starts_with('T'));
    assert_eq!(percentile.2, "2");

    let count = parsed
        .iter()
        .find(|(_, id, _)| id.name() == "latency" && id.tag("statistic") == Some("count"))
        .expect("timer count published");
    assert_eq!(count.2, "2");
}

#[test]
fn file_location_appends_lines() {
    let path = std::env::temp_dir().join(format!("spectator-exporter-{}.txt", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let registry = Arc::new(Registry::default());
    let mut publisher = ExporterBuilder::default()
        .with_env_override(false)
        .with_location(format!("file://{}", path.display()))
        .unwrap()
        .build(Arc::clone(&registry))
        .unwrap();

    registry.gauge("temperature", [("room", "kitchen")]).set(21.5);
    let stats = publisher.publish();
    assert_eq!(stats.payloads_written, 1);
    drop(publisher);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "g:temperature,room=kitchen,statistic=gauge:21.5\n");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn state_meters_publish_as_gauges() {
    let registry = Arc::new(Registry::default());
    let mut publisher = ExporterBuilder::default()
        .with_env_override(false)
        .with_location("memory")
        .unwrap()
        .build(Arc::clone(&registry))
        .unwrap();

    registry.gauge_with_ttl("queue", Vec::<(String, String)>::new(), Duration::from_secs(120)).set(3.0);
    registry.long_task_timer("jobs", Vec::<(String, String)>::new()).start();
    publisher.publish();

    let mut lines = publisher.memory().unwrap().lines();
    lines.sort();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "g,120:queue,statistic=gauge:3");
    assert!(lines[1].starts_with("g:jobs,statistic=activeTasks:1"));
    assert!(lines[2].starts_with("g:jobs,statistic=duration:"));
}
