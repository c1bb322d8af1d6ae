//! Control channel (C1, §4.1): one request/response exchange over a
//! one-shot abstract-namespace Unix stream socket, with donated FDs riding
//! as `SCM_RIGHTS` ancillary data alongside the length-prefixed JSON frame.

use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use nix::sys::socket::{
    self, AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType,
    UnixAddr,
};
use nix::sys::uio::IoSlice;
use serde::Serialize;
use serde::de::DeserializeOwned;

use sandrun_proto::{ControlRequest, ControlResponse, Method, SandboxError, SandboxResult};

/// Build the abstract address for the given sandbox id (§6 "Control socket
/// address"): first byte is the null marker (handled by `UnixAddr`'s
/// abstract-name constructor), the remainder is the id itself.
fn abstract_address(id: &str) -> SandboxResult<UnixAddr> {
    UnixAddr::new_abstract(id.as_bytes())
        .map_err(|e| SandboxError::internal(format!("invalid control address for {id}: {e}")))
}

/// Create and bind the listening control socket for `id`, to be donated to
/// the sandbox as the controller FD (§4.4 step 4). The caller is
/// responsible for closing its own copy once the file has been handed to
/// [`crate::launcher::fd::FdTable`].
pub fn bind_listener(id: &str) -> SandboxResult<UnixListener> {
    let addr = abstract_address(id)?;
    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::empty(),
        None,
    )
    .map_err(|e| SandboxError::internal(format!("socket(2) failed: {e}")))?;
    socket::bind(fd.as_raw_fd(), &addr)
        .map_err(|e| SandboxError::internal(format!("bind(2) failed for {id}: {e}")))?;
    socket::listen(&fd, socket::Backlog::new(1).unwrap_or(socket::Backlog::MAXCONN))
        .map_err(|e| SandboxError::internal(format!("listen(2) failed for {id}: {e}")))?;
    Ok(UnixListener::from(fd))
}

/// Attempt a single connection to the sandbox's control address. Used both
/// by the readiness waiter (C5), which expects this to fail with
/// "connection refused" until the sandbox is listening, and by [`call`].
pub fn try_connect(id: &str) -> std::io::Result<UnixStream> {
    let addr = abstract_address(id)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::empty(),
        None,
    )?;
    socket::connect(fd.as_raw_fd(), &addr)?;
    Ok(UnixStream::from(fd))
}

/// Issue exactly one request/response exchange against the sandbox
/// identified by `id`, optionally donating `send_fds` alongside the
/// request and receiving `expected_recv_fds` FDs alongside the response.
/// The connection is closed on return, matching §4.6 "each operation opens
/// a new control connection, performs one RPC, and closes".
pub fn call<Req, Resp>(
    id: &str,
    method: Method,
    payload: Req,
    send_fds: &[RawFd],
    expected_recv_fds: usize,
) -> SandboxResult<(Resp, Vec<OwnedFd>)>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = try_connect(id)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;

    let request = ControlRequest::new(method, payload)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;
    let body = serde_json::to_vec(&request)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;
    write_frame_with_fds(&stream, &body, send_fds)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;

    let (frame, recv_fds) = read_frame_with_fds(&mut stream, expected_recv_fds)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;
    let response: ControlResponse = serde_json::from_slice(&frame)
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;
    let payload: Resp = response
        .into_payload()
        .map_err(|e| SandboxError::rpc(id, 0, method.as_str(), e.to_string()))?;
    Ok((payload, recv_fds))
}

fn write_frame_with_fds(stream: &UnixStream, body: &[u8], fds: &[RawFd]) -> std::io::Result<()> {
    let len = (body.len() as u32).to_be_bytes();
    if fds.is_empty() {
        let mut s = stream;
        s.write_all(&len)?;
        s.write_all(body)?;
        return Ok(());
    }

    let iov = [IoSlice::new(&len), IoSlice::new(body)];
    let cmsg = [ControlMessage::ScmRights(fds)];
    socket::sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
        .map_err(std::io::Error::from)?;
    Ok(())
}

fn read_frame_with_fds(
    stream: &mut UnixStream,
    expected_fds: usize,
) -> std::io::Result<(Vec<u8>, Vec<OwnedFd>)> {
    let mut len_buf = [0u8; 4];
    let mut fds = Vec::new();

    if expected_fds == 0 {
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len as u32 > sandrun_proto::protocol::MAX_FRAME_LEN {
            return Err(std::io::Error::other("control frame exceeds maximum length"));
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        return Ok((body, fds));
    }

    // The FD-bearing recvmsg only needs to catch the ancillary data; control
    // payloads are small, so a modest initial read is enough to grab the
    // length prefix plus the body in the common case. Anything left over
    // is read with a plain `read` afterwards.
    let mut buf = vec![0u8; 8192];
    let mut cmsg_space = nix::cmsg_space!([RawFd; 32]);
    let mut iov = [std::io::IoSliceMut::new(&mut buf)];
    let msg = socket::recvmsg::<()>(
        stream.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_space),
        MsgFlags::empty(),
    )
    .map_err(std::io::Error::from)?;

    for cmsg in msg.cmsgs().map_err(std::io::Error::from)? {
        if let ControlMessageOwned::ScmRights(received) = cmsg {
            for raw in received {
                // SAFETY: the kernel just handed us ownership of this fd
                // via SCM_RIGHTS.
                fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }
    }

    let n = msg.bytes;
    if n < 4 {
        return Err(std::io::Error::other("short control frame"));
    }
    let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    if len as u32 > sandrun_proto::protocol::MAX_FRAME_LEN {
        return Err(std::io::Error::other("control frame exceeds maximum length"));
    }
    let mut body = buf[4..n].to_vec();
    while body.len() < len {
        let mut chunk = vec![0u8; len - body.len()];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Err(std::io::Error::other("control connection closed mid-frame"));
        }
        body.extend_from_slice(&chunk[..read]);
    }
    Ok((body, fds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::thread;

    #[test]
    fn bind_and_connect_round_trip() {
        let id = format!("sandrun-test-{}", std::process::id());
        let listener = bind_listener(&id).expect("bind should succeed");

        let accepted = thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept should succeed");
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).expect("read should succeed");
            buf
        });

        let mut client = try_connect(&id).expect("connect should succeed");
        client.write_all(b"hello").expect("write should succeed");

        let received = accepted.join().expect("listener thread should not panic");
        assert_eq!(&received, b"hello");
    }

    #[test]
    fn connect_without_listener_is_refused() {
        let id = format!("sandrun-test-no-listener-{}", std::process::id());
        let result = try_connect(&id);
        assert!(result.is_err());
    }
}
