#![cfg(target_os = "linux")]

use std::io::{Error, Result};
use std::os::unix::io::RawFd;

use super::poller::{Event, Poller};

#[derive(Debug)]
pub struct Epoll {
    fd: RawFd,
}

impl Epoll {
    pub fn new() -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(Error::last_os_error());
        }
        Ok(Epoll { fd })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: ((readable as u32) * libc::EPOLLIN as u32)
                | ((writable as u32) * libc::EPOLLOUT as u32),
            u64: fd as u64,
        };
        let res = unsafe { libc::epoll_ctl(self.fd, op, fd, &mut ev) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }
}

impl Poller for Epoll {
    fn add(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, readable, writable)
    }

    fn modify(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, readable, writable)
    }

    fn delete(&self, fd: RawFd) -> Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    fn wait(&self, events: &mut [Event], timeout_ms: i32) -> Result<usize> {
        // Keep a temporary buffer of raw epoll_event so we do not rely on
        // transmuting between our portable Event and the libc representation.
        let mut raw: Vec<libc::epoll_event> = Vec::with_capacity(events.len());
        // SAFETY: the buffer is immediately initialised by the kernel through
        // epoll_wait; every entry up to the returned length is overwritten, and
        // nothing past that length is read.
        unsafe {
            raw.set_len(events.len());
        }

        let n = unsafe {
            libc::epoll_wait(self.fd, raw.as_mut_ptr(), raw.len() as i32, timeout_ms)
        };
        if n < 0 {
            return Err(Error::last_os_error());
        }

        for (dst, src) in events.iter_mut().zip(raw.iter().take(n as usize)) {
            dst.fd = src.u64 as RawFd;
            dst.readable = src.events & (libc::EPOLLIN as u32) != 0;
            dst.writable = src.events & (libc::EPOLLOUT as u32) != 0;
        }
        Ok(n as usize)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
