//! Hosts a mount on a background thread.

use std::ffi::{OsStr, OsString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::MountError;
use crate::native;
use crate::operations::FuseOperations;
use crate::platform;

#[derive(Default)]
struct State {
    started: bool,
    finished: bool,
    thread: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
    exit: Option<Result<(), MountError>>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    exited: Condvar,
}

/// Runs the blocking libfuse main loop on a dedicated thread.
///
/// `stop` (and `Drop`) tear down in order: unmount, wait for the thread,
/// then dispose the filesystem exactly once.
///
/// ```ignore
/// let service = FuseService::new(MemoryFs::new(), vec!["/mnt/mem".into(), "-f".into()])?;
/// service.start()?;
/// // ...
/// service.stop()?;
/// ```
pub struct FuseService<F: FuseOperations> {
    dispatcher: Arc<Dispatcher<F>>,
    args: Vec<OsString>,
    shared: Arc<Shared>,
}

impl<F: FuseOperations> FuseService<F> {
    /// Fails if the running platform has no supported native layout.
    pub fn new(fs: F, args: Vec<OsString>) -> Result<Self, MountError> {
        let platform = *platform::init()?;
        Ok(FuseService {
            dispatcher: Arc::new(Dispatcher::new(fs, platform)),
            args,
            shared: Arc::new(Shared::default()),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<F> {
        &self.dispatcher
    }

    /// The last argument, by libfuse convention the mount point.
    pub fn mount_point(&self) -> Option<&OsStr> {
        self.args.last().map(OsString::as_os_str)
    }

    /// Spawns the mount thread. A service can be started only once.
    pub fn start(&self) -> Result<(), MountError> {
        let mut state = self.shared.state.lock();
        if state.started {
            return Err(MountError::AlreadyStarted);
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let args = self.args.clone();
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("fuse-service".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| native::run(&dispatcher, &args)))
                    .unwrap_or(Err(MountError::ThreadPanicked));
                match &result {
                    Ok(()) => info!("filesystem unmounted"),
                    Err(e) => error!("mount loop failed: {}", e),
                }
                let mut state = shared.state.lock();
                state.finished = true;
                state.exit = Some(result);
                shared.exited.notify_all();
            })?;

        info!(
            "started fuse service for {}",
            self.mount_point().map(Path::new).unwrap_or(Path::new("?")).display()
        );
        state.started = true;
        state.thread_id = Some(handle.thread().id());
        state.thread = Some(handle);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        let state = self.shared.state.lock();
        state.started && !state.finished
    }

    fn on_service_thread(&self) -> bool {
        self.shared.state.lock().thread_id == Some(thread::current().id())
    }

    fn wait_finished(&self) -> MutexGuard<'_, State> {
        let mut state = self.shared.state.lock();
        while state.started && !state.finished {
            self.shared.exited.wait(&mut state);
        }
        state
    }

    /// Blocks until the mount loop returns and reports how it ended. Later
    /// calls return `Ok`.
    pub fn wait_exit(&self) -> Result<(), MountError> {
        if self.on_service_thread() {
            return Ok(());
        }
        let (thread, exit) = {
            let mut state = self.wait_finished();
            (state.thread.take(), state.exit.take())
        };
        if let Some(thread) = thread {
            thread.join().map_err(|_| MountError::ThreadPanicked)?;
        }
        exit.unwrap_or(Ok(()))
    }

    /// Unmounts, waits for the mount thread unless called from it, then
    /// disposes the filesystem. Safe to call more than once. A failed
    /// unmount is still followed by the join and dispose, then reported.
    pub fn stop(&self) -> Result<(), MountError> {
        self.shutdown(|mount_point| native::unmount(mount_point, false))
    }

    fn shutdown(
        &self,
        unmount: impl FnOnce(&Path) -> Result<(), MountError>,
    ) -> Result<(), MountError> {
        let mut outcome = Ok(());
        if self.is_running() {
            if let Some(mount_point) = self.mount_point() {
                info!("unmounting {}", Path::new(mount_point).display());
                if let Err(e) = unmount(Path::new(mount_point)) {
                    warn!("unmount failed: {}", e);
                    outcome = Err(e);
                }
            }
        }

        if !self.on_service_thread() {
            let thread = self.wait_finished().thread.take();
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    warn!("mount thread panicked");
                }
            }
        }

        self.dispatcher.dispose();
        outcome
    }
}

impl<F: FuseOperations> Drop for FuseService<F> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop fuse service: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::DirEntries;
    use crate::error::FsResult;
    use crate::file_info::FileInfo;
    use crate::flags::ReadDirFlags;
    use crate::memory::NativePath;
    use crate::stat::FileStat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl FuseOperations for Counting {
        type Context = ();

        fn dispose(&self) -> FsResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn get_attr(&self, _path: &NativePath<'_>, _info: Option<&FileInfo<'_, ()>>) -> FsResult<FileStat> {
            Ok(FileStat::directory(0o755))
        }

        fn read_dir<'a>(
            &'a self,
            _path: &NativePath<'_>,
            _offset: i64,
            _flags: ReadDirFlags,
            _info: &FileInfo<'_, ()>,
        ) -> FsResult<DirEntries<'a>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    fn service(disposed: &Arc<AtomicUsize>) -> FuseService<Counting> {
        // A mount point that cannot exist, so the loop always exits at once.
        let args = vec![OsString::from("-f"), OsString::from("/nonexistent/fuseshim/mnt")];
        FuseService::new(Counting(Arc::clone(disposed)), args).unwrap()
    }

    #[test]
    fn test_mount_point_is_last_argument() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let service = service(&disposed);
        assert_eq!(service.mount_point(), Some(OsStr::new("/nonexistent/fuseshim/mnt")));
        assert!(!service.is_running());
    }

    #[test]
    fn test_failed_mount_reports_through_wait_exit() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let service = service(&disposed);
        service.start().unwrap();
        assert!(service.wait_exit().is_err());
        assert!(!service.is_running());
        assert!(service.wait_exit().is_ok());
    }

    #[test]
    fn test_start_twice_fails() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let service = service(&disposed);
        service.start().unwrap();
        assert!(matches!(service.start(), Err(MountError::AlreadyStarted)));
        let _ = service.wait_exit();
    }

    #[test]
    fn test_stop_and_drop_dispose_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        {
            let service = service(&disposed);
            service.start().unwrap();
            let _ = service.wait_exit();
            service.stop().unwrap();
            service.stop().unwrap();
        }
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_without_start_disposes() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let service = service(&disposed);
        service.stop().unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_unmount_still_disposes() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let service = service(&disposed);
        service.shared.state.lock().started = true;
        assert!(service.is_running());

        let shared = Arc::clone(&service.shared);
        let result = service.shutdown(|path| {
            // The loop ends on its own after the failed unmount.
            let mut state = shared.state.lock();
            state.finished = true;
            shared.exited.notify_all();
            Err(MountError::Unmount {
                path: path.display().to_string(),
                reason: "busy".into(),
            })
        });

        assert!(matches!(result, Err(MountError::Unmount { .. })));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!service.is_running());
        service.stop().unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
