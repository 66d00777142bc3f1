use depcache_rs::{Cache, DepCache};
use depcache_rs::cache::iterator::InstalledExt;
use depcache_rs::progress::LogProgress;

fn main() {
	env_logger::init();

	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optopt(  "c", "config",     "Read the config from FILE", "FILE");
		opts.optopt(  "r", "root",       "Operate on the system below DIR", "DIR");
		opts.optflag( "",  "dist",       "upgrade: allow installing and removing packages");
		opts.optflag( "",  "purge",      "remove: also remove configuration files");
		opts.optflag( "",  "fix-broken", "install/remove: repair broken packages afterwards");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") || parsed_options.free.is_empty() {
			eprintln!("{}", opts.usage("Usage: depcache-rs [options] <update|stats|show|install|remove|upgrade|fix> [packages]"));
			return;
		}

		parsed_options
	};

	if let Err(e) = init(&parsed_options) {
		log::error!("Failed to initialize: {}", e);
		std::process::exit(1);
	}

	let command = parsed_options.free[0].as_str();
	let packages = &parsed_options.free[1..];

	let res = match command {
		"update" => update(),
		"stats" => stats(),
		"show" => show(packages),
		"install" => change(packages, Request::Install, parsed_options.opt_present("fix-broken")),
		"remove" => change(packages, if parsed_options.opt_present("purge") { Request::Purge } else { Request::Remove }, parsed_options.opt_present("fix-broken")),
		"upgrade" => upgrade(parsed_options.opt_present("dist")),
		"fix" => fix(),
		other => Err(Error::UnknownCommand(other.to_string())),
	};

	if let Err(e) = res {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

fn init(options: &getopts::Matches) -> Result<(), Error> {
	let config_path = options.opt_str("config")
		.map(std::path::PathBuf::from)
		.unwrap_or_else(depcache_rs::Config::default_path);

	let mut config = match depcache_rs::Config::load_from_disk(&config_path) {
		Ok(c) => c,
		Err(e) => {
			log::debug!("Failed to read config file {}: {}", config_path.display(), e);
			log::debug!("Using default config.");
			depcache_rs::Config::default()
		},
	};
	if let Some(root) = options.opt_str("root") {
		config.rebase(root);
	}
	depcache_rs::init_with(config)?;
	Ok(())
}

fn load() -> Result<Cache, Error> {
	Ok(Cache::load(&mut LogProgress::new("Reading package lists"))?)
}

fn update() -> Result<(), Error> {
	let config = depcache_rs::config()?;
	let summary = depcache_rs::acquire::update_lists(config, &mut LogProgress::new("Fetching package lists"))?;
	println!("{} fetched, {} unchanged, {} failed", summary.fetched, summary.hits, summary.failed.len());
	for (uri, reason) in &summary.failed {
		println!("\tFailed {}: {}", uri, reason);
	}
	if summary.failed.is_empty() {
		Ok(())
	} else {
		Err(Error::Incomplete)
	}
}

fn stats() -> Result<(), Error> {
	let cache = load()?;
	let depcache = DepCache::attach(&cache, &mut LogProgress::new("Building dependency tree"));

	let installed = cache.packages().installed().count();
	let upgradable = cache.packages().filter(|p| depcache.is_upgradable(p.id())).count();
	let garbage = cache.packages().filter(|p| depcache.is_garbage(p.id())).count();
	println!("Packages:   {}", cache.package_count());
	println!("Versions:   {}", cache.version_count());
	println!("Installed:  {}", installed);
	println!("Upgradable: {}", upgradable);
	println!("Unneeded:   {}", garbage);
	println!("Broken:     {}", depcache.broken_count());
	Ok(())
}

fn show(names: &[String]) -> Result<(), Error> {
	if names.is_empty() {
		return Err(Error::MissingArgument);
	}
	let cache = load()?;
	let depcache = DepCache::attach(&cache, &mut LogProgress::new("Building dependency tree"));

	for name in names {
		let package = cache.lookup(name).ok_or_else(|| Error::UnknownPackage(name.clone()))?;
		println!("{}:", package.full_name());
		match package.current_version() {
			Some(v) => println!("  Installed: {}", v.ver_str()),
			None => println!("  Installed: (none)"),
		}
		match depcache.candidate_version(package.id()) {
			Some(v) => println!("  Candidate: {}", v.ver_str()),
			None => println!("  Candidate: (none)"),
		}
		println!("  Version table:");
		for v in package.versions() {
			let marker = if package.current_version().as_ref() == Some(&v) { "***" } else { "   " };
			println!("   {} {} {}", marker, v.ver_str(), depcache.policy().priority(v));
			for dep in v.dependencies() {
				println!("        {:?}", dep);
			}
		}
		if package.is_virtual() {
			for (v, _) in package.provides_list() {
				println!("  Provided by {} {}", v.package().full_name(), v.ver_str());
			}
		}
	}
	Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Request {
	Install,
	Remove,
	Purge,
}

fn change(names: &[String], request: Request, fix_broken: bool) -> Result<(), Error> {
	if names.is_empty() {
		return Err(Error::MissingArgument);
	}
	let cache = load()?;
	let mut depcache = DepCache::attach(&cache, &mut LogProgress::new("Building dependency tree"));

	{
		let mut group = depcache.action_group();
		for name in names {
			let package = cache.lookup(name).ok_or_else(|| Error::UnknownPackage(name.clone()))?;
			match request {
				Request::Install => group.mark_install(package.id()),
				Request::Remove => group.mark_delete(package.id()),
				Request::Purge => group.mark_delete_with(package.id(), true),
			}
		}
	}

	if fix_broken && !depcache.fix_broken() {
		print_plan(&depcache);
		return Err(Error::Unresolvable);
	}
	print_plan(&depcache);
	if depcache.broken_count() != 0 {
		return Err(Error::Unresolvable);
	}
	Ok(())
}

fn upgrade(dist: bool) -> Result<(), Error> {
	let cache = load()?;
	let mut depcache = DepCache::attach(&cache, &mut LogProgress::new("Building dependency tree"));
	let ok = depcache.upgrade(dist);
	print_plan(&depcache);
	if ok { Ok(()) } else { Err(Error::Unresolvable) }
}

fn fix() -> Result<(), Error> {
	let cache = load()?;
	let mut depcache = DepCache::attach(&cache, &mut LogProgress::new("Building dependency tree"));
	let ok = depcache.fix_broken();
	print_plan(&depcache);
	if ok { Ok(()) } else { Err(Error::Unresolvable) }
}

/// Prints what applying the markings would do.
fn print_plan(depcache: &DepCache) {
	let cache = depcache.cache();
	let list = |title: &str, filter: &dyn Fn(depcache_rs::PackageId) -> bool| {
		let names: Vec<String> = cache.packages()
			.filter(|p| filter(p.id()))
			.map(|p| p.name().to_string())
			.collect();
		if !names.is_empty() {
			println!("{}", title);
			println!("  {}", names.join(" "));
		}
	};

	list("The following packages have unmet dependencies:", &|p| depcache.is_inst_broken(p));
	list("The following packages will be REMOVED:", &|p| depcache.marked_delete(p));
	list("The following NEW packages will be installed:", &|p| depcache.marked_install(p));
	list("The following packages will be upgraded:", &|p| depcache.marked_upgrade(p) && !depcache.marked_downgrade(p));
	list("The following packages will be DOWNGRADED:", &|p| depcache.marked_downgrade(p));
	list("The following packages have been kept back:", &|p| depcache.marked_keep(p) && depcache.is_upgradable(p));
	list("The following packages are no longer required:", &|p| depcache.is_garbage(p) && !depcache.marked_delete(p));

	println!(
		"{} upgraded, {} newly installed, {} to remove and {} not upgraded.",
		depcache.upgrade_count(), depcache.inst_count(), depcache.del_count(), depcache.keep_count(),
	);
	println!("Need to get {}.", depcache_rs::size_to_string(depcache.deb_size() as f64));
	let usr = depcache.usr_size();
	if usr >= 0 {
		println!("After this operation, {} of additional disk space will be used.", depcache_rs::size_to_string(usr as f64));
	} else {
		println!("After this operation, {} disk space will be freed.", depcache_rs::size_to_string(-usr as f64));
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("depcache-rs error: {0}")]
	DepCache(#[from] depcache_rs::Error),
	#[error("Missing argument")]
	MissingArgument,
	#[error("Unknown command \"{0}\"")]
	UnknownCommand(String),
	#[error("Unable to locate package {0}")]
	UnknownPackage(String),
	#[error("Unable to correct problems, broken packages remain")]
	Unresolvable,
	#[error("Some index files failed to download")]
	Incomplete,
}
