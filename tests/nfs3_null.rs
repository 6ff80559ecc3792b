//! End-to-end NFS3/MOUNT dispatch over a loopback duplex stream, the
//! same shape as `pipeline::channel`'s own `echoes_decoded_lines_back_out`
//! test but driving the full `install_nfs_server` stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ortho_wire::nfs3::dispatch::{install_nfs_server, Filesystem};
use ortho_wire::nfs3::{mount, proc, MOUNT_PROGRAM, NFS_PROGRAM};
use ortho_wire::pipeline::promise::Completer;
use ortho_wire::rpc::framing::FragmentLimits;
use ortho_wire::rpc::{AcceptStat, CallBody, Message, OpaqueAuth, Reply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;

/// A `Filesystem` that only ever answers `null`; every other method
/// would panic if dispatched, which this test never does.
struct NullOnlyFs {
    null_calls: Arc<AtomicUsize>,
}

macro_rules! unreachable_proc {
    ($name:ident, $call_ty:path, $reply_ty:path) => {
        fn $name(&self, _call: $call_ty, _completer: Completer<$reply_ty>) {
            unreachable!("test never dispatches this procedure")
        }
    };
}

impl Filesystem for NullOnlyFs {
    fn null(&self, completer: Completer<()>) {
        self.null_calls.fetch_add(1, Ordering::SeqCst);
        completer.keep(());
    }

    unreachable_proc!(getattr, proc::getattr::Call, proc::getattr::Reply);
    unreachable_proc!(setattr, proc::setattr::Call, proc::setattr::Reply);
    unreachable_proc!(lookup, proc::lookup::Call, proc::lookup::Reply);
    unreachable_proc!(access, proc::access::Call, proc::access::Reply);
    unreachable_proc!(readlink, proc::readlink::Call, proc::readlink::Reply);
    unreachable_proc!(read, proc::read::Call, proc::read::Reply);
    unreachable_proc!(readdir, proc::readdir::Call, proc::readdir::Reply);
    unreachable_proc!(readdirplus, proc::readdirplus::Call, proc::readdirplus::Reply);
    unreachable_proc!(fsstat, proc::fsstat::Call, proc::fsstat::Reply);
    unreachable_proc!(fsinfo, proc::fsinfo::Call, proc::fsinfo::Reply);
    unreachable_proc!(pathconf, proc::pathconf::Call, proc::pathconf::Reply);
    unreachable_proc!(mount, mount::mnt::Call, mount::mnt::Reply);
    unreachable_proc!(unmount, mount::umnt::Call, mount::umnt::Reply);

    fn shutdown(&self, completer: Completer<()>) {
        completer.keep(());
    }
}

/// Installs a `tracing` subscriber that writes through the test
/// harness's captured output. Safe to call from every test: `try_init`
/// no-ops if a global subscriber is already set.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn encode_null_call(xid: u32, program: u32, procedure: u32) -> Bytes {
    let call = CallBody {
        program,
        version: 3,
        procedure,
        credentials: OpaqueAuth::NONE,
        verifier: OpaqueAuth::NONE,
    };
    let mut payload = BytesMut::new();
    Message::Call { xid, call }.write(&mut payload);

    let mut framed = BytesMut::new();
    let header = 0x8000_0000u32 | payload.len() as u32;
    framed.extend_from_slice(&header.to_be_bytes());
    framed.extend_from_slice(&payload);
    framed.freeze()
}

async fn read_one_reply(client: &mut tokio::io::DuplexStream) -> Message {
    let mut decoder = ortho_wire::rpc::framing::FragmentDecoder::default();
    let mut buf = BytesMut::new();
    loop {
        if let Some(frame) = decoder.decode(&mut buf).unwrap() {
            let mut cursor: &[u8] = &frame[..];
            return Message::read(&mut cursor).unwrap();
        }
        let mut chunk = [0u8; 256];
        let n = client.read(&mut chunk).await.unwrap();
        assert!(n > 0, "server closed without replying");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn nfs_program_null_round_trips() {
    init_tracing();
    let (client, server) = tokio::io::duplex(4096);
    let null_calls = Arc::new(AtomicUsize::new(0));
    let fs = NullOnlyFs { null_calls: null_calls.clone() };
    let _handle = install_nfs_server(server, fs, FragmentLimits::default());

    let mut client = client;
    client.write_all(&encode_null_call(42, NFS_PROGRAM, proc::NULL)).await.unwrap();

    match read_one_reply(&mut client).await {
        Message::Reply { xid, reply: Reply::Accepted(accepted) } => {
            assert_eq!(xid, 42);
            assert_eq!(accepted.stat, AcceptStat::Success);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(null_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mount_program_null_round_trips() {
    init_tracing();
    let (client, server) = tokio::io::duplex(4096);
    let null_calls = Arc::new(AtomicUsize::new(0));
    let fs = NullOnlyFs { null_calls: null_calls.clone() };
    let _handle = install_nfs_server(server, fs, FragmentLimits::default());

    let mut client = client;
    client.write_all(&encode_null_call(7, MOUNT_PROGRAM, mount::NULL)).await.unwrap();

    match read_one_reply(&mut client).await {
        Message::Reply { xid, reply: Reply::Accepted(accepted) } => {
            assert_eq!(xid, 7);
            assert_eq!(accepted.stat, AcceptStat::Success);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(null_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_procedure_gets_proc_unavail() {
    init_tracing();
    let (client, server) = tokio::io::duplex(4096);
    let fs = NullOnlyFs { null_calls: Arc::new(AtomicUsize::new(0)) };
    let _handle = install_nfs_server(server, fs, FragmentLimits::default());

    let mut client = client;
    client.write_all(&encode_null_call(1, NFS_PROGRAM, 999)).await.unwrap();

    match read_one_reply(&mut client).await {
        Message::Reply { reply: Reply::Accepted(accepted), .. } => {
            assert_eq!(accepted.stat, AcceptStat::ProcUnavail);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}
