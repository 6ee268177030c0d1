use proptest::prelude::*;
use tom::test_utils::EngineCluster;

#[derive(Debug, Clone)]
enum Op {
    Multicast(usize),
    Deliver(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (0usize..8).prop_map(Op::Multicast),
        3 => (0usize..64).prop_map(Op::Deliver),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_any_interleaving_yields_one_order(
        size in 2u32..=5,
        ops in prop::collection::vec(op(), 1..80),
        drain in prop::collection::vec(any::<usize>(), 0..400),
    ) {
        let mut cluster = EngineCluster::new(size);
        let mut sent = 0;

        for op in ops {
            match op {
                Op::Multicast(node) => {
                    cluster.multicast(node % cluster.size(), format!("m{sent}"));
                    sent += 1;
                }
                Op::Deliver(choice) => {
                    let ready = cluster.ready_links();
                    if !ready.is_empty() {
                        let (from, to) = ready[choice % ready.len()];
                        cluster.deliver_next(from, to);
                    }
                }
            }
        }

        let mut drain = drain.into_iter();
        cluster.run(|n| drain.next().unwrap_or(0) % n);

        let first = cluster.delivered_ids(0);
        prop_assert_eq!(first.len(), sent);
        prop_assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
        for index in 1..cluster.size() {
            prop_assert_eq!(&cluster.delivered_ids(index), &first);
        }
        for index in 0..cluster.size() {
            prop_assert_eq!(cluster.engine(index).pending_len(), 0);
            prop_assert_eq!(cluster.engine(index).ack_entries(), 0);
        }
    }

    #[test]
    fn prop_prefixes_never_disagree(
        ops in prop::collection::vec(op(), 1..60),
    ) {
        // Stop mid-exchange: whatever each process has delivered so far must
        // be a prefix of the same sequence
        let mut cluster = EngineCluster::new(3);
        for (n, op) in ops.into_iter().enumerate() {
            match op {
                Op::Multicast(node) => {
                    cluster.multicast(node % 3, format!("m{n}"));
                }
                Op::Deliver(choice) => {
                    let ready = cluster.ready_links();
                    if !ready.is_empty() {
                        let (from, to) = ready[choice % ready.len()];
                        cluster.deliver_next(from, to);
                    }
                }
            }
        }

        let orders: Vec<_> = (0..3).map(|i| cluster.delivered_ids(i)).collect();
        let longest = orders.iter().max_by_key(|o| o.len()).cloned().unwrap_or_default();
        for order in &orders {
            prop_assert_eq!(&longest[..order.len()], &order[..]);
        }
    }
}
