//! 完成适配器的派发契约测试。
//!
//! # 教案级导览
//!
//! - **Why**：流量生成场景下大量连接长时间空闲地等待接收；适配器若为每个在途操作占用一个
//!   线程，空闲接收就会耗尽线程池，使其他连接的发送永远得不到执行。
//! - **How**：以单工作线程、单阻塞线程的运行时驱动回环连接对，先挂起若干空闲接收，
//!   再在另一端发送，观察接收是否按时完成；另外覆盖运行时关闭与会话关闭句柄两条拆除路径。
//! - **What**：每个被接受的提交恰好回调一次，且回调携带真实字节数或中止状态码。

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::BytesMut;
use socket2::Socket;
use tidal_core::{
    CompletionAdapter, ERROR_OPERATION_ABORTED, ErrorCode, IoAction, IoCompletion, IoEnvironment,
    IoLimits, IoTask, NO_ERROR, SessionParent, SocketSession,
};

fn constrained_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .expect("测试运行时必须可构建")
}

fn environment(runtime: &tokio::runtime::Runtime) -> IoEnvironment {
    IoEnvironment::new(runtime.handle().clone(), IoLimits::default())
}

/// 建立一条回环连接，返回 `(连接端, 接受端)`。
fn loopback_pair() -> (Arc<Socket>, Arc<Socket>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("绑定回环端口");
    let addr = listener.local_addr().expect("监听地址");
    let client = TcpStream::connect(addr).expect("回环连接");
    let (server, _) = listener.accept().expect("接受连接");
    (
        Arc::new(Socket::from(client)),
        Arc::new(Socket::from(server)),
    )
}

fn submit_to_channel(
    adapter: &CompletionAdapter,
    task: IoTask,
    sender: &mpsc::Sender<IoCompletion>,
) {
    let sender = sender.clone();
    adapter
        .submit(task, move |completion| {
            let _ = sender.send(completion);
        })
        .expect("提交应被接受");
}

/// 多个空闲接收挂起时，另一连接上的发送与接收仍能在单线程池上完成。
#[test]
fn idle_receives_do_not_starve_other_operations() {
    let runtime = constrained_runtime();
    let env = environment(&runtime);

    let (idle_client, _idle_server) = loopback_pair();
    let idle = CompletionAdapter::bind(&idle_client, &env).expect("绑定空闲连接");
    let (idle_tx, idle_rx) = mpsc::channel();
    for _ in 0..4 {
        submit_to_channel(
            &idle,
            IoTask::new(IoAction::Recv, BytesMut::zeroed(16)),
            &idle_tx,
        );
    }

    let (puller_socket, pusher_socket) = loopback_pair();
    let puller = CompletionAdapter::bind(&puller_socket, &env).expect("绑定接收端");
    let pusher = CompletionAdapter::bind(&pusher_socket, &env).expect("绑定发送端");
    let (pull_tx, pull_rx) = mpsc::channel();
    let (push_tx, push_rx) = mpsc::channel();
    submit_to_channel(
        &puller,
        IoTask::new(IoAction::Recv, BytesMut::zeroed(64)),
        &pull_tx,
    );
    submit_to_channel(
        &pusher,
        IoTask::new(IoAction::Send, BytesMut::from(&b"hello"[..])),
        &push_tx,
    );

    let pushed = push_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("发送必须在超时前完成");
    assert_eq!((pushed.transferred, pushed.status), (5, NO_ERROR));

    let pulled = pull_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("接收必须在超时前完成");
    assert_eq!(pulled.status, NO_ERROR);
    assert_eq!(pulled.transferred, 5);
    assert_eq!(&pulled.task.window()[..5], b"hello");

    assert!(idle_rx.try_recv().is_err(), "空闲接收不应提前完成");
    assert_eq!(idle.outstanding(), 4);
    assert_eq!(puller.outstanding(), 0);
    assert_eq!(pusher.outstanding(), 0);
}

/// 运行时关闭时仍在等待的接收被丢弃，回调以中止状态恰好投递一次。
#[test]
fn runtime_shutdown_aborts_pending_receive_once() {
    let runtime = constrained_runtime();
    let env = environment(&runtime);
    let (client, _server) = loopback_pair();
    let adapter = CompletionAdapter::bind(&client, &env).expect("绑定连接");
    let (tx, rx) = mpsc::channel();
    submit_to_channel(
        &adapter,
        IoTask::new(IoAction::Recv, BytesMut::zeroed(8)),
        &tx,
    );
    drop(tx);

    runtime.shutdown_timeout(Duration::from_secs(1));

    let aborted = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("被丢弃的接收必须补发完成");
    assert_eq!(aborted.status, ERROR_OPERATION_ABORTED);
    assert_eq!(aborted.transferred, 0);
    assert_eq!(aborted.task.action(), IoAction::Recv);
    assert!(
        rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "每个操作只能回调一次"
    );
    assert_eq!(adapter.outstanding(), 0);
}

struct SilentParent;

impl SessionParent for SilentParent {
    fn complete_state(&self, _error: ErrorCode) {}
}

/// 关闭句柄会唤醒在途接收，并释放会话持有的适配器。
#[test]
fn close_handle_wakes_receive_and_releases_adapter() {
    let runtime = constrained_runtime();
    let parent: Arc<dyn SessionParent> = Arc::new(SilentParent);
    let parent: Weak<dyn SessionParent> = Arc::downgrade(&parent);
    let session = SocketSession::new(parent, environment(&runtime));
    let (client, _server) = loopback_pair();
    let client = Arc::try_unwrap(client).expect("套接字尚未共享");
    session.set_handle(client);

    let adapter = session
        .completion_adapter()
        .expect("绑定连接")
        .expect("句柄有效时应创建适配器");
    let (tx, rx) = mpsc::channel();
    submit_to_channel(
        &adapter,
        IoTask::new(IoAction::Recv, BytesMut::zeroed(8)),
        &tx,
    );
    assert_eq!(adapter.outstanding(), 1);

    session.close_handle();
    assert!(!session.has_handle());
    assert!(!session.has_completion_adapter());

    let woken = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("关闭句柄后接收必须尽快完成");
    assert_eq!(woken.transferred, 0);
    assert_eq!(adapter.outstanding(), 0);
    assert!(session.completion_adapter().expect("无句柄时不绑定").is_none());
}
