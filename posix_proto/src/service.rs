//! Server-side dispatch of envelopes onto a [`PosixService`].

use crate::messages::*;
use crate::{method, response_envelope, PosixMethod};
use ipc::MessageEnvelope;
use thiserror::Error;

/// Everything a posix server answers.
///
/// Implementations execute (or simulate) the syscall and report its return
/// value and errno verbatim.
pub trait PosixService {
    fn accept(&mut self, request: AcceptRequest) -> AcceptResponse;
    fn bind(&mut self, request: BindRequest) -> RetResponse;
    fn close(&mut self, request: CloseRequest) -> RetResponse;
    fn connect(&mut self, request: ConnectRequest) -> RetResponse;
    fn get_sock_name(&mut self, request: GetSockNameRequest) -> GetSockNameResponse;
    fn get_sock_opt(&mut self, request: GetSockOptRequest) -> GetSockOptResponse;
    fn get_sock_opt_int(&mut self, request: GetSockOptIntRequest) -> GetSockOptIntResponse;
    fn get_sock_opt_timeval(
        &mut self,
        request: GetSockOptTimevalRequest,
    ) -> GetSockOptTimevalResponse;
    fn listen(&mut self, request: ListenRequest) -> RetResponse;
    fn recv(&mut self, request: RecvRequest) -> RecvResponse;
    fn send(&mut self, request: SendRequest) -> RetResponse;
    fn send_to(&mut self, request: SendToRequest) -> RetResponse;
    fn set_sock_opt(&mut self, request: SetSockOptRequest) -> RetResponse;
    fn set_sock_opt_int(&mut self, request: SetSockOptIntRequest) -> RetResponse;
    fn set_sock_opt_timeval(&mut self, request: SetSockOptTimevalRequest) -> RetResponse;
    fn socket(&mut self, request: SocketRequest) -> SocketResponse;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("malformed {method} message: {source}")]
    Codec {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

fn serve<R, F>(request: &MessageEnvelope, handler: F) -> Result<MessageEnvelope, DispatchError>
where
    R: PosixMethod,
    F: FnOnce(R) -> R::Response,
{
    let codec = |source| DispatchError::Codec {
        method: R::METHOD.to_string(),
        source,
    };
    let decoded: R = request.payload.deserialize().map_err(codec)?;
    let response = handler(decoded);
    response_envelope(R::METHOD, &response, request.id).map_err(codec)
}

/// Decodes `request`, runs the matching service method and wraps its
/// response in an envelope correlated to the request.
pub fn dispatch<S>(service: &mut S, request: &MessageEnvelope) -> Result<MessageEnvelope, DispatchError>
where
    S: PosixService + ?Sized,
{
    match request.action.as_str() {
        method::ACCEPT => serve::<AcceptRequest, _>(request, |r| service.accept(r)),
        method::BIND => serve::<BindRequest, _>(request, |r| service.bind(r)),
        method::CLOSE => serve::<CloseRequest, _>(request, |r| service.close(r)),
        method::CONNECT => serve::<ConnectRequest, _>(request, |r| service.connect(r)),
        method::GET_SOCK_NAME => serve::<GetSockNameRequest, _>(request, |r| service.get_sock_name(r)),
        method::GET_SOCK_OPT => serve::<GetSockOptRequest, _>(request, |r| service.get_sock_opt(r)),
        method::GET_SOCK_OPT_INT => serve::<GetSockOptIntRequest, _>(request, |r| service.get_sock_opt_int(r)),
        method::GET_SOCK_OPT_TIMEVAL => serve::<GetSockOptTimevalRequest, _>(request, |r| service.get_sock_opt_timeval(r)),
        method::LISTEN => serve::<ListenRequest, _>(request, |r| service.listen(r)),
        method::RECV => serve::<RecvRequest, _>(request, |r| service.recv(r)),
        method::SEND => serve::<SendRequest, _>(request, |r| service.send(r)),
        method::SEND_TO => serve::<SendToRequest, _>(request, |r| service.send_to(r)),
        method::SET_SOCK_OPT => serve::<SetSockOptRequest, _>(request, |r| service.set_sock_opt(r)),
        method::SET_SOCK_OPT_INT => serve::<SetSockOptIntRequest, _>(request, |r| service.set_sock_opt_int(r)),
        method::SET_SOCK_OPT_TIMEVAL => serve::<SetSockOptTimevalRequest, _>(request, |r| service.set_sock_opt_timeval(r)),
        method::SOCKET => serve::<SocketRequest, _>(request, |r| service.socket(r)),
        other => Err(DispatchError::UnknownMethod(other.to_string())),
    }
}
