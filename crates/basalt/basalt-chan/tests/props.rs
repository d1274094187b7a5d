//! Property tests: FIFO delivery and stream reassembly for arbitrary
//! message sequences and read buffer sizes.

use basalt_chan::{Channel, ChannelOptions};
use proptest::prelude::*;

fn messages() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..300), 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunked_reads_reconstruct_the_concatenation(
        msgs in messages(),
        chunks in prop::collection::vec(1usize..64, 1..16),
    ) {
        let (mut guest, mut host) = Channel::pair(64 * 1024, &ChannelOptions::default()).unwrap();
        for m in &msgs {
            prop_assert_eq!(host.write(m).unwrap(), m.len());
        }

        let expected = msgs.concat();
        let mut got = Vec::with_capacity(expected.len());
        let mut i = 0;
        while got.len() < expected.len() {
            let mut buf = vec![0u8; chunks[i % chunks.len()]];
            i += 1;
            let n = guest.try_read(&mut buf).expect("published bytes went missing");
            prop_assert!(n > 0);
            got.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(got, expected);
        prop_assert_eq!(guest.try_read(&mut [0u8; 8]), None);
    }

    #[test]
    fn reads_never_cross_a_frame_boundary(msgs in messages(), chunk in 1usize..400) {
        let (mut guest, mut host) = Channel::pair(64 * 1024, &ChannelOptions::default()).unwrap();
        for m in &msgs {
            host.write(m).unwrap();
        }

        let mut buf = vec![0u8; chunk];
        for m in &msgs {
            let mut got = Vec::new();
            while got.len() < m.len() {
                let n = guest.try_read(&mut buf).expect("message went missing");
                prop_assert!(got.len() + n <= m.len());
                got.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(&got, m);
        }
    }
}
