#![allow(clippy::uninlined_format_args)]
use catrack_algorithms::{FindTracksOutput, LineFollowConfig, LineFollowKernel, TrackFinder};
use catrack_core::constants::SPEED_OF_LIGHT_INV;
use catrack_core::simulate::{simulate_timeslice, SimulationConfig, BOGUS_HIT_TIME};
use catrack_core::{
    CounterKey, FinderConfig, Hit, HitIndex, InputData, Parameters, TimesliceHeader, TimerKey,
    TrackingMode, WindowConfig,
};
use std::collections::HashSet;

const THREAD_COUNTS: [usize; 5] = [1, 2, 3, 4, 8];

fn run(
    params: &Parameters,
    input: &InputData,
    config: FinderConfig,
) -> (FindTracksOutput, TimesliceHeader) {
    let kernel = LineFollowKernel::new(params, LineFollowConfig::default());
    let mut finder = TrackFinder::new(params.clone(), config, kernel).unwrap();
    let mut header = TimesliceHeader::default();
    let output = finder.find_tracks(input, &mut header);
    (output, header)
}

/// Found tracks as sorted lists of hit ids, in a canonical order.
fn track_set(input: &InputData, output: &FindTracksOutput) -> Vec<Vec<u32>> {
    let mut set: Vec<Vec<u32>> = output
        .tracks
        .iter()
        .map(|track| {
            let mut ids: Vec<u32> = output
                .track_hits(track)
                .iter()
                .map(|&i| input.hit(i).id)
                .collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    set.sort();
    set
}

fn assert_consistent(input: &InputData, output: &FindTracksOutput) {
    let bogus: HashSet<HitIndex> = output.bogus_hits.iter().copied().collect();
    let mut seen = HashSet::new();
    for &index in &output.hit_indices {
        assert!((index as usize) < input.hit_count(), "hit {} out of range", index);
        assert!(!bogus.contains(&index), "bogus hit {} in a track", index);
        assert!(seen.insert(index), "hit {} used twice", index);
    }

    let mut offset = 0;
    for track in &output.tracks {
        assert_eq!(track.first_hit, offset);
        offset += track.n_hits;
    }
    assert_eq!(offset, output.hit_indices.len());

    let monitor = &output.monitor;
    assert_eq!(monitor.counter_value(CounterKey::TrackingCall), 1);
    assert_eq!(monitor.counter_value(CounterKey::RecoHit), input.hit_count() as u64);
    assert_eq!(monitor.counter_value(CounterKey::RecoTrack), output.n_tracks() as u64);
    assert_eq!(
        monitor.counter_value(CounterKey::RecoHitUsed),
        output.hit_indices.len() as u64
    );
    assert_eq!(
        monitor.counter_value(CounterKey::BogusHit),
        output.bogus_hits.len() as u64
    );
    assert_eq!(
        monitor.counter_value(CounterKey::SubTimeslice),
        output.stats.n_sub_windows() as u64
    );
    assert_eq!(monitor.timer(TimerKey::Tracking).n_calls(), 1);
}

/// Events in the middle of 100 ns windows: an anchor event at 0 ns fixes
/// the timeslice start, the others follow at `100 * j + 50` ns.
fn separated_events(params: &Parameters, n_events: u32) -> InputData {
    let mut streams: Vec<Vec<Hit>> = vec![Vec::new(); params.n_stations_active()];
    let mut id = 0u32;
    let mut add_track = |event_time: f64, tx: f64, ty: f64| {
        for (station, st) in params.stations.iter().enumerate() {
            let path = st.z * (1.0 + tx * tx + ty * ty).sqrt();
            let t = event_time + path * SPEED_OF_LIGHT_INV;
            streams[station].push(
                Hit::new(station, tx * st.z, ty * st.z, st.z, t, 2 * id)
                    .with_keys(2 * id, 2 * id + 1)
                    .with_id(id),
            );
            id += 1;
        }
    };

    add_track(0.0, 0.1, 0.1);
    add_track(0.0, -0.1, -0.1);
    for j in 1..=n_events {
        let event_time = f64::from(j) * 100.0 + 50.0;
        let ty = 0.02 * f64::from(j % 5);
        add_track(event_time, 0.1, ty);
        add_track(event_time, -0.15, -0.05);
    }

    let mut builder = InputData::builder(0);
    for stream in streams {
        builder.push_stream(stream);
    }
    builder.build().unwrap()
}

#[test]
fn test_separated_events_are_thread_count_invariant() {
    let params = Parameters::uniform(4, 10.0, 10.0);
    let input = separated_events(&params, 40);
    let window = WindowConfig::default().with_window_length(100.0);

    let (reference, reference_header) =
        run(&params, &input, FinderConfig::default().with_window(window));
    assert_eq!(reference.n_tracks(), 82);
    assert!(reference.tracks.iter().all(|t| t.n_hits == 4));

    for n_threads in THREAD_COUNTS {
        let config = FinderConfig::default()
            .with_window(window)
            .with_threads(n_threads);
        let (output, header) = run(&params, &input, config);
        assert_consistent(&input, &output);
        assert_eq!(
            track_set(&input, &output),
            track_set(&input, &reference),
            "{} threads",
            n_threads
        );
        assert_eq!(header, reference_header);
        assert_eq!(output.stats.threads.len(), n_threads);
        assert_eq!(output.stats.n_merge_conflicts, 0);
    }
}

#[test]
fn test_simulated_timeslice_invariants() {
    let params = Parameters::uniform(4, 20.0, 10.0);
    let sim = SimulationConfig::default()
        .with_events(200)
        .with_noise(20)
        .with_bogus_hits(3)
        .with_seed(11);
    let ts = simulate_timeslice(&params, &sim).unwrap();
    let input = &ts.input;

    let mut reference: Option<(Vec<HitIndex>, TimesliceHeader)> = None;
    for n_threads in THREAD_COUNTS {
        let config = FinderConfig::for_mode(TrackingMode::Sts)
            .with_window(WindowConfig::default().with_window_length(2_000.0))
            .with_threads(n_threads);
        let (output, header) = run(&params, input, config);
        assert_consistent(input, &output);
        assert!(header.start <= header.end);

        let mut bogus = output.bogus_hits.clone();
        bogus.sort_unstable();
        assert_eq!(bogus.len(), 3);
        assert!(bogus
            .iter()
            .all(|&i| input.hit(i).t >= BOGUS_HIT_TIME));

        match &reference {
            None => reference = Some((bogus, header)),
            Some((expected_bogus, expected_header)) => {
                assert_eq!(&bogus, expected_bogus, "{} threads", n_threads);
                assert_eq!(&header, expected_header, "{} threads", n_threads);
            }
        }

        // nearly every generated track is found
        assert!(
            output.n_tracks() * 10 >= ts.n_true_tracks * 8,
            "{} threads: {} of {} tracks",
            n_threads,
            output.n_tracks(),
            ts.n_true_tracks
        );
    }
}

#[test]
fn test_found_tracks_are_pure() {
    let params = Parameters::uniform(4, 20.0, 10.0);
    let sim = SimulationConfig::default().with_events(100).with_seed(3);
    let ts = simulate_timeslice(&params, &sim).unwrap();

    let config = FinderConfig::default().with_threads(4);
    let (output, _) = run(&params, &ts.input, config);
    assert_consistent(&ts.input, &output);

    let pure = output
        .tracks
        .iter()
        .filter(|track| {
            let truth: HashSet<Option<u32>> = output
                .track_hits(track)
                .iter()
                .map(|&i| ts.true_track_of(ts.input.hit(i)))
                .collect();
            truth.len() == 1
        })
        .count();
    assert!(pure * 10 >= output.n_tracks() * 9);
}

#[test]
fn test_high_rate_mode_is_consistent() {
    let params = Parameters::uniform(4, 20.0, 10.0);
    let sim = SimulationConfig::default()
        .with_events(400)
        .with_event_interval(200.0)
        .with_tracks_per_event(1, 2)
        .with_seed(5);
    let ts = simulate_timeslice(&params, &sim).unwrap();

    let config = FinderConfig::for_mode(TrackingMode::Mcbm).with_threads(2);
    let (output, _) = run(&params, &ts.input, config);
    assert_consistent(&ts.input, &output);
    assert_eq!(output.stats.threads.len(), 2);
    assert!(output.stats.n_hits_collected <= ts.input.hit_count());
}
