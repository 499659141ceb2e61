//! Blocking, path-oriented access to one entry host.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use hopline_wire::{
    build_path, AccessMode, AttributeEntry, DirListFlags, DirectoryList, Error, Location,
    LocationInfo, MkDirFlags, OpenFlags, PrepareFlags, ProtocolInfo, QueryCode, Response, Result,
    StatInfo, StatInfoVfs, Status,
};

use crate::dispatcher::Dispatcher;
use crate::ops::{
    ChMod, DelXAttr, DirList, GetXAttr, ListXAttr, Locate, MkDir, Mv, Operation, Ping, Prepare,
    Protocol, Query, Rm, RmDir, SendCache, SendInfo, SetXAttr, Stat, StatVfs, Truncate,
};
use crate::parallel::BatchResult;

/// File system operations against `host`, with relative paths resolved
/// against a working directory.
#[derive(Clone)]
pub struct FileSystem {
    dispatcher: Dispatcher,
    host: String,
    cwd: String,
}

impl FileSystem {
    /// Starts in the dispatcher's configured working directory.
    pub fn new(dispatcher: Dispatcher, host: impl Into<String>) -> Self {
        let cwd = dispatcher.config().cwd.clone();
        Self {
            dispatcher,
            host: host.into(),
            cwd,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Absolute form of `path`.
    pub fn resolve(&self, path: &str) -> Result<String> {
        build_path(&self.cwd, path)
    }

    /// Change the working directory after checking that it is a directory.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let stat = self.stat(&target).into_result()?;
        if !stat.is_dir() {
            return Err(Error::invalid(format!("{} is not a directory", target)));
        }
        self.cwd = target;
        Ok(())
    }

    fn call<O: Operation>(&self, op: Result<O>) -> Response<O::Output> {
        match op {
            Ok(op) => self.dispatcher.call(&self.host, op),
            Err(e) => Response::error(e, Vec::new()),
        }
    }

    pub fn locate(&self, path: &str, flags: OpenFlags) -> Response<LocationInfo> {
        self.call(self.resolve(path).map(|p| Locate::new(p, flags)))
    }

    pub fn stat(&self, path: &str) -> Response<StatInfo> {
        self.call(self.resolve(path).map(Stat::new))
    }

    pub fn stat_vfs(&self, path: &str) -> Response<StatInfoVfs> {
        self.call(self.resolve(path).map(StatVfs::new))
    }

    pub fn rm(&self, path: &str) -> Response<()> {
        self.call(self.resolve(path).map(Rm::new))
    }

    pub fn mv(&self, source: &str, dest: &str) -> Response<()> {
        let op = self
            .resolve(source)
            .and_then(|s| Ok(Mv::new(s, self.resolve(dest)?)));
        self.call(op)
    }

    pub fn mkdir(&self, path: &str, flags: MkDirFlags, mode: AccessMode) -> Response<()> {
        self.call(self.resolve(path).map(|p| MkDir::new(p, flags, mode)))
    }

    pub fn rmdir(&self, path: &str) -> Response<()> {
        self.call(self.resolve(path).map(RmDir::new))
    }

    pub fn chmod(&self, path: &str, mode: AccessMode) -> Response<()> {
        self.call(self.resolve(path).map(|p| ChMod::new(p, mode)))
    }

    pub fn truncate(&self, path: &str, size: u64) -> Response<()> {
        self.call(self.resolve(path).map(|p| Truncate::new(p, size)))
    }

    pub fn ping(&self) -> Response<()> {
        self.call(Ok(Ping))
    }

    pub fn protocol(&self) -> Response<ProtocolInfo> {
        self.call(Ok(Protocol))
    }

    pub fn query(&self, code: QueryCode, arg: impl Into<Bytes>) -> Response<Bytes> {
        self.call(Ok(Query::new(code, arg)))
    }

    /// Send monitoring information, at most 1024 characters.
    pub fn send_info(&self, info: &str) -> Response<Bytes> {
        self.call(Ok(SendInfo::new(info)))
    }

    pub fn send_cache(&self, info: &str) -> Response<Bytes> {
        self.call(Ok(SendCache::new(info)))
    }

    /// Prepare files; relative names are resolved like any other path.
    pub fn prepare(&self, files: &[&str], flags: PrepareFlags, priority: u8) -> Response<Bytes> {
        let files = files
            .iter()
            .map(|f| self.resolve(f))
            .collect::<Result<Vec<_>>>();
        self.call(files.map(|files| Prepare::new(files, flags, priority)))
    }

    pub fn dir_list(&self, path: &str, flags: DirListFlags) -> Response<DirectoryList> {
        self.call(self.resolve(path).map(|p| DirList::new(p, flags)))
    }

    pub fn set_xattr(
        &self,
        path: &str,
        attrs: Vec<(String, Vec<u8>)>,
    ) -> Response<Vec<AttributeEntry>> {
        self.call(self.resolve(path).map(|p| SetXAttr::new(p, attrs)))
    }

    pub fn get_xattr(&self, path: &str, names: Vec<String>) -> Response<Vec<AttributeEntry>> {
        self.call(self.resolve(path).map(|p| GetXAttr::new(p, names)))
    }

    pub fn del_xattr(&self, path: &str, names: Vec<String>) -> Response<Vec<AttributeEntry>> {
        self.call(self.resolve(path).map(|p| DelXAttr::new(p, names)))
    }

    pub fn list_xattr(&self, path: &str) -> Response<Vec<AttributeEntry>> {
        self.call(self.resolve(path).map(ListXAttr::new))
    }

    /// Remove several files at once.
    ///
    /// Every path is checked before anything is sent. The batch is an error
    /// when fewer than `min_success` removals succeed; each path's own
    /// response is kept either way.
    pub fn rm_many(&self, paths: &[&str], min_success: usize) -> Result<BatchResult<()>> {
        let ops = paths
            .iter()
            .map(|p| self.resolve(p).map(Rm::new))
            .collect::<Result<Vec<_>>>()?;
        self.dispatcher.parallel(&self.host, ops, min_success)?.wait()
    }

    /// Stat several paths at once; the batch succeeds only if all do.
    pub fn stat_many(&self, paths: &[&str]) -> Result<BatchResult<StatInfo>> {
        let ops = paths
            .iter()
            .map(|p| self.resolve(p).map(Stat::new))
            .collect::<Result<Vec<_>>>()?;
        let all = ops.len();
        self.dispatcher.parallel(&self.host, ops, all)?.wait()
    }

    /// Locate `path` down to the data servers.
    ///
    /// Managers named in an answer are asked in turn, each at most once,
    /// for at most `redirect_limit` rounds. The result is partial when a
    /// sub-locate failed but servers were still found.
    pub fn deep_locate(&self, path: &str, flags: OpenFlags) -> Response<LocationInfo> {
        let path = match self.resolve(path) {
            Ok(path) => path,
            Err(e) => return Response::error(e, Vec::new()),
        };

        let first = self.dispatcher.call(&self.host, Locate::new(path.clone(), flags));
        let mut hosts = first.hosts;
        let mut partial = first.status.is_partial();
        let mut pending = match (first.status, first.payload) {
            (Status::Error(e), _) => return Response::error(e, hosts),
            (_, Some(info)) => info.locations,
            (_, None) => {
                let error = Error::protocol("locate answered without locations");
                return Response::error(error, hosts);
            }
        };

        let limit = usize::from(self.dispatcher.config().redirect_limit);
        let mut asked: HashSet<String> = hosts.iter().map(|h| h.host.clone()).collect();
        let mut servers: Vec<Location> = Vec::new();
        let mut first_error: Option<Error> = None;
        let mut round = 0;

        loop {
            let mut managers = Vec::new();
            for location in pending.drain(..) {
                if location.is_manager() {
                    if asked.insert(location.address.clone()) {
                        managers.push(location.address);
                    }
                } else if !servers.iter().any(|s| s.address == location.address) {
                    servers.push(location);
                }
            }
            if managers.is_empty() {
                break;
            }
            if round == limit {
                warn!(
                    path = %path,
                    rounds = round,
                    unasked = managers.len(),
                    "deep locate gave up"
                );
                partial = true;
                first_error.get_or_insert(Error::RedirectLimitExceeded {
                    limit: self.dispatcher.config().redirect_limit,
                });
                break;
            }
            round += 1;
            debug!(path = %path, round, managers = managers.len(), "deep locate fan-out");

            let targets = managers
                .into_iter()
                .map(|m| (m, Locate::new(path.clone(), flags)))
                .collect();
            let batch = match self
                .dispatcher
                .parallel_at(targets, 0)
                .and_then(|group| group.wait())
            {
                Ok(batch) => batch,
                Err(e) => return Response::error(e, hosts),
            };

            for response in batch.responses {
                hosts.extend(response.hosts);
                match (response.status, response.payload) {
                    (Status::Error(e), _) => {
                        partial = true;
                        first_error.get_or_insert(e);
                    }
                    (status, Some(info)) => {
                        partial |= status.is_partial();
                        pending.extend(info.locations);
                    }
                    (_, None) => partial = true,
                }
            }
        }

        if servers.is_empty() {
            if let Some(e) = first_error {
                return Response::error(e, hosts);
            }
        }
        let info = LocationInfo { locations: servers };
        if partial {
            Response::partial(info, hosts)
        } else {
            Response::ok(info, hosts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::parallel::AggregateStatus;
    use crate::transport::mock::ScriptedExchange;
    use crate::transport::{ThreadedTransport, Transport};
    use hopline_wire::xattr;
    use hopline_wire::{Failure, OpKind, Outcome, RedirectSignal, Reply};
    use std::sync::Arc;

    fn connect(
        exchange: ScriptedExchange,
    ) -> (FileSystem, Arc<ThreadedTransport<ScriptedExchange>>) {
        connect_with(exchange, ClientConfig::default())
    }

    fn connect_with(
        exchange: ScriptedExchange,
        config: ClientConfig,
    ) -> (FileSystem, Arc<ThreadedTransport<ScriptedExchange>>) {
        let transport = Arc::new(ThreadedTransport::new(exchange));
        let shared: Arc<dyn Transport> = transport.clone();
        let dispatcher = Dispatcher::with_transport(shared, config);
        (FileSystem::new(dispatcher, "redirector"), transport)
    }

    fn ok(body: &'static str) -> Outcome {
        Outcome::Ok(Reply::new(body))
    }

    fn missing() -> Outcome {
        Outcome::Error(Failure::server(3011, "no such file"))
    }

    #[test]
    fn relative_paths_use_cwd() {
        let (mut fs, transport) = connect(
            ScriptedExchange::new()
                .on("redirector", ok("1 0 2 0"))
                .on("redirector", ok("2 10 0 0")),
        );
        fs.cd("/data").unwrap();
        assert_eq!(fs.cwd(), "/data");
        assert!(fs.stat("sub/../f").status.is_ok());

        let targets: Vec<_> = transport
            .exchange()
            .recorded()
            .into_iter()
            .map(|(_, frame)| frame.target)
            .collect();
        assert_eq!(targets, vec!["/data", "/data/f"]);
    }

    #[test]
    fn cd_into_file_is_rejected() {
        let (mut fs, _) = connect(ScriptedExchange::new().on("redirector", ok("1 10 0 0")));
        assert!(matches!(fs.cd("/f"), Err(Error::InvalidArgument { .. })));
        assert_eq!(fs.cwd(), "/");
    }

    #[test]
    fn path_errors_never_reach_the_wire() {
        let (fs, transport) = connect(ScriptedExchange::new());
        let response = fs.stat("../../x");
        assert!(matches!(response.status.error(), Some(Error::InvalidArgument { .. })));
        assert!(fs.mv("/a", "").status.error().is_some());
        assert!(transport.exchange().recorded().is_empty());
    }

    #[test]
    fn rm_many_reports_each_path() {
        let script = || {
            ScriptedExchange::new()
                .on_target("redirector", "/a", Outcome::Ok(Reply::default()))
                .on_target("redirector", "/b", Outcome::Error(Failure::connection("refused")))
                .on_target("redirector", "/c", Outcome::Ok(Reply::default()))
        };

        let cases = [(2, AggregateStatus::Partial), (3, AggregateStatus::Error)];
        for (min_success, expected) in cases {
            let (fs, _) = connect(script());
            let result = fs.rm_many(&["/a", "/b", "/c"], min_success).unwrap();
            assert_eq!(result.status, expected);
            assert!(result.responses[0].status.is_ok());
            assert!(result.responses[2].status.is_ok());
            assert!(matches!(
                result.responses[1].status.error(),
                Some(Error::TransportFailure { .. })
            ));
            let failed: Vec<_> = result.failures().map(|(i, _)| i).collect();
            assert_eq!(failed, vec![1]);
        }
    }

    #[test]
    fn rm_many_rejects_bad_batches_before_sending() {
        let (fs, transport) = connect(ScriptedExchange::new());
        assert!(fs.rm_many(&["/a", ""], 1).is_err());
        assert!(fs.rm_many(&["/a"], 2).is_err());
        assert!(transport.exchange().recorded().is_empty());

        let result = fs.rm_many(&[], 0).unwrap();
        assert_eq!(result.status, AggregateStatus::Ok);
    }

    #[test]
    fn stat_many_follows_redirects_per_member() {
        let (fs, _) = connect(
            ScriptedExchange::new()
                .on("redirector", Outcome::Redirect(RedirectSignal::to("s1")))
                .on("redirector", Outcome::Redirect(RedirectSignal::to("s1")))
                .on("s1", ok("1 1 0 0"))
                .on("s1", ok("1 1 0 0")),
        );
        let result = fs.stat_many(&["/a", "/b"]).unwrap();
        assert_eq!(result.status, AggregateStatus::Ok);
        for response in &result.responses {
            assert_eq!(response.host_names(), vec!["redirector", "s1"]);
        }
    }

    #[test]
    fn deep_locate_asks_every_manager_once() {
        let (fs, transport) = connect(
            ScriptedExchange::new()
                .on("redirector", ok("Mrm1:1094 Srs0:1094"))
                .on("m1:1094", ok("Srs1:1094 Mrm2:1094 Mrredirector"))
                .on("m2:1094", ok("Swm1s:1094 Srs1:1094")),
        );

        let response = fs.deep_locate("/data/f", OpenFlags::NONE);
        assert_eq!(response.status, Status::Ok);
        let servers: Vec<_> = response
            .payload
            .unwrap()
            .iter()
            .map(|l| l.address.clone())
            .collect();
        assert_eq!(servers, vec!["s0:1094", "s1:1094", "m1s:1094"]);
        assert_eq!(
            transport.exchange().hosts_contacted(),
            vec!["redirector", "m1:1094", "m2:1094"]
        );
    }

    #[test]
    fn deep_locate_partial_when_a_manager_fails() {
        let (fs, _) = connect(
            ScriptedExchange::new()
                .on("redirector", ok("Mrm1 Mrm2"))
                .on("m1", ok("Srs1"))
                .on("m2", missing()),
        );
        let response = fs.deep_locate("/f", OpenFlags::NONE);
        assert!(response.status.is_partial());
        assert_eq!(response.payload.unwrap().len(), 1);
    }

    #[test]
    fn deep_locate_errors_when_nothing_resolves() {
        let (fs, _) = connect(
            ScriptedExchange::new()
                .on("redirector", ok("Mrm1"))
                .on("m1", missing()),
        );
        let response = fs.deep_locate("/f", OpenFlags::NONE);
        assert!(matches!(response.status.error(), Some(Error::Server { code: 3011, .. })));

        let (fs, _) = connect(ScriptedExchange::new().on("redirector", missing()));
        assert!(fs.deep_locate("/f", OpenFlags::NONE).status.error().is_some());
    }

    #[test]
    fn deep_locate_stops_after_round_limit() {
        let config = ClientConfig::default().with_redirect_limit(1);
        let (fs, _) = connect_with(
            ScriptedExchange::new()
                .on("redirector", ok("Mrm1"))
                .on("m1", ok("Mrm2")),
            config,
        );
        let response = fs.deep_locate("/f", OpenFlags::NONE);
        assert_eq!(
            response.status.error(),
            Some(&Error::RedirectLimitExceeded { limit: 1 })
        );
    }

    #[test]
    fn xattr_round_trip_through_the_wire() {
        let reply = xattr::encode(
            &[AttributeEntry::with_value("user.a", b"1".to_vec())],
            "",
        )
        .unwrap();
        let (fs, transport) =
            connect(ScriptedExchange::new().on("redirector", Outcome::Ok(Reply::new(reply))));

        let response = fs.get_xattr("f", vec!["user.a".into()]);
        let entries = response.into_result().unwrap();
        assert_eq!(entries[0].value_str(), Some("1"));

        let (_, frame) = transport.exchange().recorded().remove(0);
        assert_eq!(frame.kind, OpKind::GetXAttr);
        assert_eq!(xattr::decode_body(&frame.body).unwrap().path, "/f");
    }
}
