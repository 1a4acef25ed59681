use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Quest - environmental data discovery, retrieval and processing
#[derive(Parser, Debug)]
#[command(name = "quest")]
#[command(about = "Environmental data discovery, retrieval and processing", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file merged over the defaults and environment
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage collections of the active project
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Discover providers, services and publishers
    #[command(subcommand)]
    Provider(ProviderCommand),

    /// Search catalogs and create catalog entries
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Add, stage, download and manage datasets
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// List and run tools
    #[command(subcommand)]
    Tool(ToolCommand),

    /// Read or update metadata of any URI
    #[command(subcommand)]
    Metadata(MetadataCommand),

    /// Publish a dataset through a provider publisher
    Publish(PublishArgs),
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show the effective settings and where each value came from
    Show,

    /// Override settings for this invocation and save them
    Set(SettingsSetArgs),
}

#[derive(Args, Debug)]
pub struct SettingsSetArgs {
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub projects_dir: Option<PathBuf>,

    /// User service roots (repeatable)
    #[arg(long = "user-service", value_name = "URI")]
    pub user_services: Vec<String>,

    /// File to save to (defaults to <BASE_DIR>/quest_settings.yml)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List projects
    List,

    /// Show the active project
    Show,

    /// Create a project
    New {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Project folder (defaults to <PROJECTS_DIR>/<name>)
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Make it the active project
        #[arg(long)]
        activate: bool,
    },

    /// Register an existing project folder
    Add {
        name: String,
        folder: PathBuf,
        #[arg(long)]
        activate: bool,
    },

    /// Make a project the active one
    Activate { name: String },

    /// Remove a project from the index
    Delete {
        name: String,
        /// Also delete the project folder
        #[arg(long)]
        delete_folder: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommand {
    List,

    New {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a collection with its datasets and files
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// List loaded providers
    List {
        /// Reload providers, including user services
        #[arg(long)]
        update_cache: bool,
    },

    /// List services
    Services {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        parameter: Option<String>,
        /// geo-discrete, geo-seamless or non-geo
        #[arg(long)]
        service_type: Option<String>,
    },

    /// List publishers
    Publishers,

    /// Parameters offered by a service or catalog entry
    Parameters { uri: String },

    /// Download options of a service or publish options of a publisher
    Options { uri: String },

    /// Store credentials for a provider in the active project
    Login {
        provider: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Delete stored credentials
    Logout { provider: String },

    /// Show whether a provider needs and has credentials
    Auth { provider: String },
}

/// Shape of `catalog search` results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SearchFormat {
    Uris,
    Table,
    Geojson,
    Expanded,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Search one or more services or collections
    Search {
        #[arg(required = true)]
        uris: Vec<String>,
        /// Filter as key=value (repeatable), e.g. bbox=[-98,30,-97,31]
        #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
        filters: Vec<String>,
        /// Query expression (repeatable)
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,
        #[arg(long)]
        update_cache: bool,
        #[arg(long, value_enum, default_value = "uris")]
        format: SearchFormat,
    },

    /// Summarize catalog metadata values of services
    Tags {
        #[arg(required = true)]
        uris: Vec<String>,
        /// Restrict to these keys (repeatable)
        #[arg(long = "key")]
        keys: Vec<String>,
        /// Count entries per value
        #[arg(long)]
        count: bool,
        #[arg(long)]
        update_cache: bool,
    },

    /// Create a catalog entry under svc://quest:quest
    New {
        /// WKT or GeoJSON geometry
        #[arg(long, conflicts_with_all = ["geom_type", "coordinates"])]
        geometry: Option<String>,
        #[arg(long, requires = "coordinates")]
        geom_type: Option<String>,
        /// GeoJSON-style coordinates as JSON
        #[arg(long, requires = "geom_type")]
        coordinates: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatasetCommand {
    /// Add catalog entries to a collection
    Add {
        collection: String,
        #[arg(required = true)]
        catalog_entries: Vec<String>,
    },

    /// Stage datasets for download with options
    Stage {
        #[arg(required = true)]
        datasets: Vec<String>,
        /// Download option as key=value (repeatable)
        #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
        options: Vec<String>,
    },

    /// Download staged datasets or whole collections
    Download {
        #[arg(required = true)]
        datasets: Vec<String>,
        /// Stop at the first failed download
        #[arg(long)]
        raise_on_error: bool,
    },

    /// Search, add, stage and download in one step
    Get {
        service_uri: String,
        #[arg(long, default_value = "default")]
        collection: String,
        #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
        filters: Vec<String>,
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,
        #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
        options: Vec<String>,
        /// Always download, even if a matching dataset exists
        #[arg(long)]
        no_cache: bool,
        #[arg(long, default_value_t = 10)]
        max_catalog_entries: usize,
        /// Merge tiles of a geo-seamless service
        #[arg(long)]
        seamless: bool,
    },

    /// List datasets
    List {
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        catalog_entry: Option<String>,
    },

    /// Delete datasets or collections
    Delete {
        #[arg(required = true)]
        uris: Vec<String>,
    },

    /// Move datasets to another collection
    Move {
        #[arg(required = true)]
        datasets: Vec<String>,
        #[arg(long)]
        to: String,
    },

    /// Copy datasets to another collection
    Copy {
        #[arg(required = true)]
        datasets: Vec<String>,
        #[arg(long)]
        to: String,
    },

    /// Print a dataset's data as JSON
    Open { name: String },

    /// Render a dataset and print the output path
    Visualize {
        name: String,
        #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ToolCommand {
    List {
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        datatype: Option<String>,
        /// Only tools that accept this dataset
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Show a tool's parameters
    Options { name: String },

    /// Run a tool
    Run {
        name: String,
        #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MetadataCommand {
    Get {
        #[arg(required = true)]
        uris: Vec<String>,
    },

    /// Update collections, datasets or svc://quest: entries; without URIs the active project
    Update {
        uris: Vec<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Metadata to merge, as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Publisher URI, e.g. pub://provider:publisher
    pub publisher: String,
    pub dataset: String,
    #[arg(long = "option", short = 'o', value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}
