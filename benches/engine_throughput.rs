use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ramqp::transport::inproc::{pipe_pair, InprocAdapter};
use ramqp::{Connection, Container, DeliveryId, Engine, Handler, IoFlags, LinkId, Message, NoopHandler};

const MESSAGES_PER_ITER: usize = 1_000;
const MAX_PASSES: usize = 1_000_000;

#[derive(Default)]
struct Counter {
  received: usize,
  bytes: usize,
}

impl Handler for Counter {
  fn on_message(&mut self, _conn: &mut Connection, _link: LinkId, _delivery: DeliveryId, message: &Message) {
    self.received += 1;
    self.bytes += message.data().map_or(0, <[u8]>::len);
  }
}

struct Pair {
  client: Engine<InprocAdapter, NoopHandler>,
  server: Engine<InprocAdapter, Counter>,
  link: LinkId,
}

impl Pair {
  fn new(prefetch: u32) -> Self {
    let container = Container::new("bench");
    let (a, b) = pipe_pair();
    let mut client = Engine::new(a, NoopHandler, container.make_options());
    let mut server = Engine::new(b, Counter::default(), container.make_options().prefetch(prefetch));
    let session = client.connection_mut().open_session().expect("open session");
    let link = client.connection_mut().open_sender(session, "bench").expect("open sender");
    let mut pair = Self { client, server, link };
    pair.pump_until(|p| p.client.connection().link_credit(p.link).unwrap_or(0) > 0);
    pair
  }

  fn pump_until(&mut self, done: impl Fn(&Self) -> bool) {
    for _ in 0..MAX_PASSES {
      if done(self) {
        return;
      }
      self.client.process(IoFlags::default()).expect("client process");
      self.server.process(IoFlags::default()).expect("server process");
    }
    panic!("benchmark exchange stalled");
  }
}

fn engine_throughput(c: &mut Criterion) {
  let mut group = c.benchmark_group("inproc_exchange");
  for size in [16usize, 1024, 64 * 1024] {
    group.throughput(Throughput::Bytes((size * MESSAGES_PER_ITER) as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      let mut pair = Pair::new(500);
      let payload = Bytes::from(vec![0xa5u8; size]);
      b.iter(|| {
        let target = pair.server.handler().received + MESSAGES_PER_ITER;
        for _ in 0..MESSAGES_PER_ITER {
          let msg = Message::from_bytes(payload.clone());
          black_box(pair.client.connection_mut().send(pair.link, &msg).expect("send"));
        }
        pair.pump_until(|p| p.server.handler().received >= target);
      });
    });
  }
  group.finish();
}

criterion_group!(benches, engine_throughput);
criterion_main!(benches);
